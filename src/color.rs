use std::sync::atomic::{AtomicBool, Ordering};

use lazy_static::lazy_static;
use nu_ansi_term::{AnsiString, Color, Style};

use crate::cli::ColorMode;

lazy_static! {
    // field names in `resolve` output
    pub(crate) static ref LABEL: Style = Color::Blue.bold();
    pub(crate) static ref MODEL_TEXT: Style = Color::Default.normal();
    // error code of a failed `call`
    pub(crate) static ref FAILURE_CODE: Style = Color::Red.bold();
    pub(crate) static ref ERROR_INDICATOR: Style = Color::Red.bold();
    pub(crate) static ref WARNING_INDICATOR: Style = Color::Yellow.bold();
    pub(crate) static ref ERROR_TEXT: Style = Color::Default.bold();
    pub(crate) static ref WARNING_TEXT: Style = Color::Default.bold();
}

/// Set once from `main`, before anything is printed
static COLOR_ENABLED: AtomicBool = AtomicBool::new(true);

pub(crate) fn configure_color(mode: ColorMode) {
    COLOR_ENABLED.store(mode == ColorMode::On, Ordering::Relaxed);
}

fn color_enabled() -> bool {
    COLOR_ENABLED.load(Ordering::Relaxed)
}

pub(crate) trait MaybePaint {
    /// `text` in this style, or unstyled when color output is off
    #[must_use]
    fn maybe_paint<'a>(&self, text: &'a str) -> AnsiString<'a>;
}

impl MaybePaint for Style {
    fn maybe_paint<'a>(&self, text: &'a str) -> AnsiString<'a> {
        if color_enabled() {
            self.paint(text)
        } else {
            AnsiString::from(text)
        }
    }
}
