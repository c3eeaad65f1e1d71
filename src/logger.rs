//! Terminal echo of session lifecycle events for the `debug` option.
//!
//! Everything is also sent to the `log` facade, so applications with a logger
//! installed see the same lines without enabling `debug`.

use colorful::Color;
use colorful::Colorful;

pub(crate) fn status(debug: bool, message: &str) {
    log::info!("{message}");

    if !debug {
        return;
    }

    #[cfg(windows)]
    println!("{message}");

    #[cfg(not(windows))]
    println!(
        "{}",
        message.gradient_with_color(Color::Cyan, Color::SpringGreen4)
    );
}

pub(crate) fn failure(debug: bool, message: &str) {
    log::warn!("{message}");

    if !debug {
        return;
    }

    #[cfg(windows)]
    println!("{message}");

    #[cfg(not(windows))]
    println!("{}", message.gradient_with_color(Color::Red, Color::Magenta));
}
