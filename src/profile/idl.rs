//! IDL profile. Also the source of the Z-buffer templates both profiles share.

use super::{common_info_prefixes, PlotTemplates, SessionProfile, PRINT_MARKER, RUN_BATCH};
use crate::plot::PlotSize;

pub(super) const PROMPT: &str = "IDL>";

pub(super) fn profile() -> SessionProfile {
    SessionProfile {
        name: "idl".to_string(),
        display_name: "IDL".to_string(),
        command: "idl".to_string(),
        args: Vec::new(),
        prompt: PROMPT.to_string(),
        raster: PlotTemplates {
            preamble: RASTER_PREAMBLE.to_string(),
            postamble: RASTER_POSTAMBLE.to_string(),
        },
        vector: None,
        default_size: PlotSize::default(),
        info_prefixes: common_info_prefixes(),
        marker_template: PRINT_MARKER.to_string(),
        batch_template: RUN_BATCH.to_string(),
        exit_command: "exit".to_string(),
    }
}

/// Off-screen Z-buffer at the requested resolution with plot state reset.
pub(super) const RASTER_PREAMBLE: &str = "\
set_plot, 'Z'
device, z_buffering=1, set_resolution=[{width}, {height}]
!p.multi = 0
!p.font = -1
!p.charsize = 1.2
!p.charthick = 1.2
!p.thick = 1.5
!p.color = 0
!p.background = 255
";

/// Reads the Z-buffer back through the colour table and writes it unless blank.
pub(super) const RASTER_POSTAMBLE: &str = "\
tvlct, idlbridge_r, idlbridge_g, idlbridge_b, /get
idlbridge_img = tvrd()
device, /close
idlbridge_dims = size(idlbridge_img, /dimensions)
idlbridge_rgb = bytarr(3, idlbridge_dims[0], idlbridge_dims[1])
idlbridge_rgb[0, *, *] = idlbridge_r[idlbridge_img]
idlbridge_rgb[1, *, *] = idlbridge_g[idlbridge_img]
idlbridge_rgb[2, *, *] = idlbridge_b[idlbridge_img]
if total(idlbridge_img) ne 0 then {writer}
delvar, idlbridge_r, idlbridge_g, idlbridge_b, idlbridge_img, idlbridge_dims, idlbridge_rgb
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idl_profile_has_no_vector_device() {
        let profile = profile();
        assert_eq!(profile.prompt, "IDL>");
        assert!(profile.vector.is_none());
    }

    #[test]
    fn raster_postamble_skips_blank_buffers() {
        assert!(RASTER_POSTAMBLE.contains("if total(idlbridge_img) ne 0 then {writer}"));
    }

    #[test]
    fn raster_preamble_sizes_canvas() {
        let rendered = SessionProfile::render(RASTER_PREAMBLE, PlotSize::new(600, 800), "''", "");
        assert!(rendered.contains("set_resolution=[600, 800]"));
    }
}
