use class_dispatch_api::run;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("class dispatch error: {err}");
        std::process::exit(1);
    }
}
