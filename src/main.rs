mod cli;
mod fetch;
mod gate;
mod logging;
mod my_regex;
mod naming;
mod outside;
mod pipeline;
mod planner;
mod report;
mod result;
mod settings;
mod transcode;
mod types;

use cli::Args;
use gate::DependencyGate;
use logging::init_logging;
use outside::StreamDownloader;
use pipeline::{Collaborators, Outcome, Request};
use result::Error;
use settings::Settings;
use tracing::info;

fn main() -> miette::Result<()> {
    let args = match Args::try_parse_from(std::env::args_os()) {
        Ok(args) => args,
        Err(err) => {
            // Help and version go to stdout with success, usage errors exit with 1
            let code = i32::from(err.use_stderr());
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let settings = Settings::load(&args).map_err(Error::into_report)?;
    init_logging(settings.log_level(args.verbosity))?;

    // Validated before the gate: it may self-update the fetcher over the network
    let request = Request::from_args(&args).map_err(Error::into_report)?;
    info!("Source: {}", request.source);

    let tools = DependencyGate::new(&settings)
        .check(request.source.is_remote())
        .map_err(Error::into_report)?;
    let collaborators = Collaborators {
        fetcher: tools.fetcher.as_ref().map(|f| f as &dyn StreamDownloader),
        encoder: &tools.encoder,
        prober: &tools.prober,
    };

    match pipeline::run(&request, &settings, collaborators).map_err(Error::into_report)? {
        Outcome::Planned(commands) => {
            for command in commands {
                println!("{command}");
            }
        }
        Outcome::Transcoded(done) => {
            info!("Output written to {}", done.output.path.display());
            done.summary(&request.source).print();
        }
    }

    Ok(())
}
