use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = vodsyncctl::Cli::parse();
    vodsyncctl::init_tracing();
    if let Err(err) = vodsyncctl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
