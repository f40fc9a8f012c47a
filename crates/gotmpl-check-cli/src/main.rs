use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre;
use gotmpl_check_cli::{Cli, Command, logging};

fn main() -> eyre::Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let (_, use_color) =
        logging::setup_logging(cli.log.log_level, cli.log.log_format, cli.log.color.into())?;

    match cli.command {
        Command::Check(args) => {
            let report = gotmpl_check_cli::check(&args)?;
            let mut stdout = std::io::stdout().lock();
            gotmpl_check_cli::write_report(&report, args.format, use_color, &mut stdout)?;
            Ok(if report.has_errors() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}
