//! GNU Data Language profile.

use super::{common_info_prefixes, PlotTemplates, SessionProfile, PRINT_MARKER, RUN_BATCH};
use crate::plot::PlotSize;

pub(super) const PROMPT: &str = "GDL>";

pub(super) fn profile() -> SessionProfile {
    SessionProfile {
        name: "gdl".to_string(),
        display_name: "GDL".to_string(),
        command: "gdl".to_string(),
        args: Vec::new(),
        prompt: PROMPT.to_string(),
        raster: PlotTemplates {
            preamble: super::idl::RASTER_PREAMBLE.to_string(),
            postamble: super::idl::RASTER_POSTAMBLE.to_string(),
        },
        vector: Some(PlotTemplates {
            preamble: VECTOR_PREAMBLE.to_string(),
            postamble: VECTOR_POSTAMBLE.to_string(),
        }),
        default_size: PlotSize::default(),
        info_prefixes: common_info_prefixes(),
        marker_template: PRINT_MARKER.to_string(),
        batch_template: RUN_BATCH.to_string(),
        exit_command: "exit".to_string(),
    }
}

// GDL ships an SVG device; the file is written by the device itself.
const VECTOR_PREAMBLE: &str = "\
set_plot, 'SVG'
device, filename={outfile}, xsize={width}, ysize={height}
!p.multi = 0
!p.font = -1
!p.color = 0
!p.background = 255
";

const VECTOR_POSTAMBLE: &str = "\
device, /close_file
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gdl_profile_defaults() {
        let profile = profile();
        assert_eq!(profile.name, "gdl");
        assert_eq!(profile.command, "gdl");
        assert_eq!(profile.prompt, "GDL>");
        assert_eq!(profile.default_size, PlotSize::new(400, 250));
        assert!(profile.vector.is_some());
    }

    #[test]
    fn vector_templates_target_outfile() {
        let vector = profile().vector.expect("gdl has svg device");
        assert!(vector.preamble.contains("{outfile}"));
        assert!(vector.postamble.contains("close_file"));
    }
}
