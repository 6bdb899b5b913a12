use std::io::{self, IsTerminal};

use crate::RequestedColorMode;

pub(crate) mod call;
pub(crate) mod list;
pub(crate) mod resolve;

/// The outcome of a subcommand; errors are reported by `main`
pub(crate) type CmdResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ColorMode {
    On,
    Off,
}

impl RequestedColorMode {
    /// Settles `auto`: color stays off when `NO_COLOR` is set or when stderr,
    /// where warnings and errors go, is not a terminal.
    pub(crate) fn resolve(self) -> ColorMode {
        let enabled = match self {
            RequestedColorMode::On => true,
            RequestedColorMode::Off => false,
            RequestedColorMode::Auto => {
                std::env::var_os("NO_COLOR").is_none() && io::stderr().is_terminal()
            }
        };

        if enabled {
            ColorMode::On
        } else {
            ColorMode::Off
        }
    }
}
