use mock_server::{run, Registry};
use tokio::net::TcpListener;

const SAMPLE_JOB: &str = "<project><builders/></project>";

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("127.0.0.1:{port}");

    let mut registry = Registry::new();
    registry.add_job("job/sample", SAMPLE_JOB);
    if let (Ok(user), Ok(password)) = (std::env::var("FIXTURE_USER"), std::env::var("FIXTURE_PASSWORD")) {
        registry.require_credentials(&user, &password);
    }

    let listener = TcpListener::bind(&addr).await?;
    println!("fixture server listening on {addr}");
    run(listener, registry.shared()).await
}
