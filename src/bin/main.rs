use taplink::{cli, config, telemetry};

fn main() {
    let cli = cli::parse_from(std::env::args_os());

    let cfg = config::load_or_init();
    telemetry::init(cli.verbose, &cfg.logging);

    if let Err(e) = cli::run(cli) {
        tracing::error!(
            transience = ?e.transience(),
            effect = e.effect().as_str(),
            "error: {e}"
        );
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
