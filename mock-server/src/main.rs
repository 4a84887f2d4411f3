//! Standalone mock of the Rest.li endpoints, for trying the CLI by hand:
//! `PORT=3000 cargo run -p mock-server` then
//! `LINKEDIN_BASE_URL=http://127.0.0.1:3000/rest linkedin-ads ad-account get --id 123456`.

use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    println!("mock Rest.li API on http://{addr}/rest");
    mock_server::run(listener).await
}
