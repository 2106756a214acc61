use log::LevelFilter;

pub struct Logger;

impl Logger {
    /// Installs the colored logger. `RUST_LOG` directives, when set, refine the CLI level.
    pub fn init(level: LevelFilter) {
        let mut builder = colog::default_builder();
        builder.filter_level(level);
        builder.parse_env(env_logger::Env::default());
        builder.init();
    }
}
