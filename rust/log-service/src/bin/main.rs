#[tokio::main]
async fn main() {
    chroma_log_service::log_service_entrypoint().await;
}
