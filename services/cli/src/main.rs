use compliance_cli::run;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("compliance error [{}]: {err}", err.code());
        std::process::exit(1);
    }
}
