use anyhow::{Context as _, Result};
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tracing::info;

pub fn router() -> Router {
    Router::new().route("/", get(alive))
}

async fn alive() -> &'static str {
    "Bot is Online!"
}

/// Serves the liveness endpoint on all interfaces.
pub async fn serve(port: u16) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    info!("liveness endpoint listening on port {port}");
    serve_on(listener).await
}

pub async fn serve_on(listener: TcpListener) -> Result<()> {
    axum::serve(listener, router()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn root_reports_alive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_on(listener));

        let res = reqwest::get(format!("http://{addr}/")).await.unwrap();
        assert!(res.status().is_success());
        assert_eq!(res.text().await.unwrap(), "Bot is Online!");
        server.abort();
    }
}
