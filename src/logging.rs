//! Structured logging setup. Call `init` once, at the top of `main`, before
//! any other component is constructed.

use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

const PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%S%.3f)} {l} [{T}] {t} - {m}{n}";

/// Initialise logging for the named component (used as the log file stem).
/// When `log_dir` is `None` only the console appender is configured, which is
/// the common case for tests and short-lived tools.
pub fn init(component: &str, log_dir: Option<&str>) {
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();

    let mut builder = Config::builder().appender(Appender::builder().build("console", Box::new(console)));
    let mut root = Root::builder().appender("console");

    if let Some(dir) = log_dir {
        let log_path = format!("{dir}/{component}.log");
        let roll_pattern = format!("{dir}/{component}.{{}}.log.gz");
        let roller = FixedWindowRoller::builder()
            .build(&roll_pattern, 5)
            .expect("invalid log roller pattern");
        let trigger = SizeTrigger::new(50 * 1024 * 1024);
        let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));
        let file = RollingFileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build(&log_path, Box::new(policy))
            .expect("could not open log file for writing");
        builder = builder.appender(Appender::builder().build("file", Box::new(file)));
        root = root.appender("file");
    }

    let config = builder
        .build(root.build(log::LevelFilter::Info))
        .expect("invalid logging configuration");

    log4rs::init_config(config).expect("logging already initialised");
}
