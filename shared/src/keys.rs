use crate::scene::FitMode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shortcut {
    ToggleGrid,
    ToggleFog,
    ToggleRuler,
    ShowMapTab,
    ToggleHelp,
    ToggleSidebar,
    Fit(FitMode),
    ExportScene,
}

impl Shortcut {
    /// Shortcuts that shadow a browser binding.
    pub fn prevents_default(self) -> bool {
        matches!(self, Self::Fit(_) | Self::ExportScene | Self::ToggleSidebar)
    }
}

/// Maps a `KeyboardEvent.key` to an action. Keys typed into form fields
/// never trigger shortcuts.
pub fn shortcut_for(key: &str, ctrl_or_meta: bool, in_text_field: bool) -> Option<Shortcut> {
    if in_text_field {
        return None;
    }
    if ctrl_or_meta {
        return match key {
            "0" => Some(Shortcut::Fit(FitMode::Contain)),
            "1" => Some(Shortcut::Fit(FitMode::Cover)),
            "2" => Some(Shortcut::Fit(FitMode::Stretch)),
            "s" | "S" => Some(Shortcut::ExportScene),
            _ => None,
        };
    }
    match key {
        "g" | "G" => Some(Shortcut::ToggleGrid),
        "f" | "F" => Some(Shortcut::ToggleFog),
        "r" | "R" => Some(Shortcut::ToggleRuler),
        "m" | "M" => Some(Shortcut::ShowMapTab),
        "?" => Some(Shortcut::ToggleHelp),
        "Tab" => Some(Shortcut::ToggleSidebar),
        _ => None,
    }
}

pub fn is_text_field_tag(tag: &str) -> bool {
    matches!(
        tag.to_ascii_lowercase().as_str(),
        "input" | "textarea" | "select"
    )
}

pub fn is_pan_key(key: &str) -> bool {
    key == " "
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_keys_toggle_layers() {
        assert_eq!(shortcut_for("g", false, false), Some(Shortcut::ToggleGrid));
        assert_eq!(shortcut_for("F", false, false), Some(Shortcut::ToggleFog));
        assert_eq!(shortcut_for("?", false, false), Some(Shortcut::ToggleHelp));
        assert_eq!(shortcut_for("x", false, false), None);
    }

    #[test]
    fn ctrl_digits_pick_fit_mode() {
        assert_eq!(
            shortcut_for("1", true, false),
            Some(Shortcut::Fit(FitMode::Cover))
        );
        assert_eq!(shortcut_for("s", true, false), Some(Shortcut::ExportScene));
        assert_eq!(shortcut_for("g", true, false), None);
        assert!(Shortcut::ExportScene.prevents_default());
        assert!(!Shortcut::ToggleGrid.prevents_default());
    }

    #[test]
    fn text_fields_swallow_everything() {
        assert_eq!(shortcut_for("g", false, true), None);
        assert_eq!(shortcut_for("s", true, true), None);
        assert!(is_text_field_tag("TEXTAREA"));
        assert!(!is_text_field_tag("canvas"));
    }
}
