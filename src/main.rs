use clap::Parser;
use oitlab::application::HeadlessApplication;
use oitlab::settings::CliArgs;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = CliArgs::parse();
    log::trace!("Starting with args: {:?}", args);

    let list_algorithms = args.list_algorithms;
    let mut app = HeadlessApplication::new(args);
    if list_algorithms {
        app.list_algorithms();
        return Ok(());
    }

    if let Err(e) = app.run() {
        log::error!("{e:#}");
        return Err(e);
    }
    Ok(())
}
