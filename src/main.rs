use clap::Parser;

use tilecanvas::cli;
use tilecanvas::logger;
use tilecanvas::settings::EditorSettings;

fn main() -> std::process::ExitCode {
    let settings = EditorSettings::load();

    // Initialize session log (overwrites previous session log)
    logger::init(settings.log_level);

    // First run: write the defaults out so they can be edited
    if EditorSettings::settings_path().is_some_and(|p| !p.exists()) {
        settings.save();
    }

    let args = cli::CliArgs::parse();
    cli::run(args, &settings)
}
