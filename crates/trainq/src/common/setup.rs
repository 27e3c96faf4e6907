use env_logger::DEFAULT_FILTER_ENV;
use env_logger::fmt::style::Style;
use log::LevelFilter;
use std::io::Write;

const OWN_CRATES: [&str; 2] = ["trainq", "trainq_core"];

/// Sets up the logger. Our own crates log at `Info` (`Debug` with `verbose`),
/// everything else only at `Warn`. `RUST_LOG` overrides both.
pub fn setup_logging(verbose: bool) {
    let own_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut builder = env_logger::Builder::default();
    builder.filter_level(LevelFilter::Warn);
    for module in OWN_CRATES {
        builder.filter_module(module, own_level);
    }

    let has_debug = std::env::var(DEFAULT_FILTER_ENV)
        .map(|v| v.contains("debug"))
        .unwrap_or(false);

    if verbose || has_debug {
        builder.format_timestamp_millis();
    } else {
        // <time> <level> [<component>] <message>
        builder.format(|buf, record| {
            let level_style = buf.default_level_style(record.level()).bold();
            let dimmed = Style::new().dimmed();
            writeln!(
                buf,
                "{dimmed}{}{dimmed:#} {level_style}{:<5}{level_style:#} {dimmed}[{}]{dimmed:#} {}",
                buf.timestamp_seconds(),
                record.level(),
                component(record.target()),
                record.args()
            )
        });
    }

    builder.parse_default_env();
    builder.init();
}

/// Last segment of a module path, e.g. `reactor` for
/// `trainq_core::internal::server::reactor`.
fn component(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}
