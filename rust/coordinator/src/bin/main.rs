#[tokio::main]
async fn main() {
    chroma_coordinator::coordinator_entrypoint().await;
}
