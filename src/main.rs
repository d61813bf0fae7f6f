#[tokio::main]
async fn main() {
    canvas::start_server().await;
}
