//! `storefront watch`: a terminal order view over HTTP and the realtime socket

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use common::ApiResponse;
use config::{AuthConfig, ReconcileConfig};
use orders::realtime::FeedItem;
use orders::reconcile::{BoardScope, EventFeed, OrderBoard, OrderSource, PollPolicy, Reconciler};
use orders::{Order, OrderError, OrderStatus};

/// Who is watching and where
#[derive(Debug, Clone)]
pub struct WatchTarget {
    pub base_url: Url,
    pub user_id: String,
    pub admin: bool,
    pub user_header: String,
}

impl WatchTarget {
    pub fn new(base_url: &str, user_id: impl Into<String>, admin: bool, auth: &AuthConfig) -> Result<Self> {
        let base_url = Url::parse(base_url).with_context(|| format!("Invalid server URL: {}", base_url))?;
        Ok(Self {
            base_url,
            user_id: user_id.into(),
            admin,
            user_header: auth.user_header.to_lowercase(),
        })
    }

    fn scope(&self) -> BoardScope {
        if self.admin {
            BoardScope::Admin
        } else {
            BoardScope::Customer(self.user_id.clone())
        }
    }

    fn list_url(&self) -> Result<Url> {
        let path = if self.admin { "/admin/orders" } else { "/orders" };
        Ok(self.base_url.join(path)?)
    }

    fn realtime_url(&self) -> Result<Url> {
        let mut url = self.base_url.join("/realtime")?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow!("Cannot derive a socket URL from {}", self.base_url))?;
        if self.admin {
            url.set_query(Some("admin=true"));
        }
        Ok(url)
    }
}

pub fn poll_policy(reconcile: &ReconcileConfig) -> PollPolicy {
    PollPolicy {
        interval: Duration::from_secs(reconcile.poll_interval_secs),
        connected_grace: Duration::from_secs(reconcile.connected_grace_secs),
        min_interval: Duration::from_secs(reconcile.min_poll_interval_secs),
    }
}

/// Polls the order list endpoint
struct HttpOrderSource {
    client: reqwest::Client,
    url: Url,
    user_header: String,
    user_id: String,
}

#[async_trait]
impl OrderSource for HttpOrderSource {
    async fn fetch(&self) -> orders::Result<Vec<Order>> {
        let unreachable = |e: reqwest::Error| OrderError::Storage(format!("order list request failed: {}", e));

        let response = self
            .client
            .get(self.url.clone())
            .header(self.user_header.as_str(), self.user_id.as_str())
            .send()
            .await
            .map_err(unreachable)?;
        let status = response.status();
        let body: ApiResponse<Vec<Order>> = response.json().await.map_err(unreachable)?;

        if !status.is_success() || !body.success {
            return Err(OrderError::Storage(format!(
                "order list request returned {}: {}",
                status,
                body.message.unwrap_or_default()
            )));
        }
        Ok(body.data.unwrap_or_default())
    }
}

/// Text frames from the realtime socket
struct SocketFeed {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl EventFeed for SocketFeed {
    async fn next_event(&mut self) -> Option<FeedItem> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(FeedItem::from_frame(&text)),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "Realtime socket failed");
                    return None;
                }
            }
        }
        None
    }
}

async fn connect_feed(target: &WatchTarget) -> Result<SocketFeed> {
    let url = target.realtime_url()?;
    let mut request = url.as_str().into_client_request()?;
    request.headers_mut().insert(
        HeaderName::from_bytes(target.user_header.as_bytes())?,
        HeaderValue::from_str(&target.user_id)?,
    );

    let (stream, _) = tokio_tungstenite::connect_async(request)
        .await
        .with_context(|| format!("Failed to open {}", url))?;
    info!(%url, "Realtime socket connected");
    Ok(SocketFeed { stream })
}

/// One status line for the board
pub fn summarize(board: &OrderBoard) -> String {
    let counts = board.status_counts();
    let mut line = format!("{} orders", board.orders().len());
    for status in OrderStatus::ALL {
        let count = counts.get(&status).copied().unwrap_or(0);
        if count > 0 {
            line.push_str(&format!(" | {} {}", status, count));
        }
    }
    if board.is_stale() {
        line.push_str(&format!(
            " | stale: {}",
            board.last_error().unwrap_or("last refresh failed")
        ));
    }
    line
}

/// Run until `shutdown` fires
pub async fn run(target: WatchTarget, policy: PollPolicy, shutdown: CancellationToken) -> Result<()> {
    let source = HttpOrderSource {
        client: reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?,
        url: target.list_url()?,
        user_header: target.user_header.clone(),
        user_id: target.user_id.clone(),
    };

    let feed = match connect_feed(&target).await {
        Ok(feed) => Some(feed),
        Err(e) => {
            warn!(error = %e, "Realtime unavailable, polling only");
            None
        }
    };

    let reconciler = Reconciler::new(source, policy, target.scope());
    let board = reconciler.board();
    let render = tokio::spawn(render(board, shutdown.clone()));

    reconciler.run(feed, shutdown).await;
    let _ = render.await;
    Ok(())
}

async fn render(board: Arc<RwLock<OrderBoard>>, shutdown: CancellationToken) {
    let mut seen = 0;
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let line = {
                    let board = board.read();
                    if board.revision() == seen {
                        continue;
                    }
                    seen = board.revision();
                    summarize(&board)
                };
                println!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orders::realtime::OrderEvent;
    use serde_json::json;

    fn target(admin: bool) -> WatchTarget {
        WatchTarget::new("http://shop.local:8080", "u1", admin, &AuthConfig::default()).unwrap()
    }

    #[test]
    fn test_urls() {
        assert_eq!(target(false).list_url().unwrap().as_str(), "http://shop.local:8080/orders");
        assert_eq!(target(true).list_url().unwrap().as_str(), "http://shop.local:8080/admin/orders");
        assert_eq!(target(false).realtime_url().unwrap().as_str(), "ws://shop.local:8080/realtime");
        assert_eq!(
            target(true).realtime_url().unwrap().as_str(),
            "ws://shop.local:8080/realtime?admin=true"
        );

        let secure = WatchTarget::new("https://shop.example.com", "u1", false, &AuthConfig::default()).unwrap();
        assert_eq!(secure.realtime_url().unwrap().as_str(), "wss://shop.example.com/realtime");
    }

    #[tokio::test]
    async fn test_secure_socket_reaches_transport() {
        use tokio_tungstenite::tungstenite::error::{Error, UrlError};

        // Nothing listens on port 1; the failure must come from the TCP
        // connect, not from a missing TLS connector.
        let result = tokio_tungstenite::connect_async("wss://127.0.0.1:1/realtime").await;
        match result {
            Err(Error::Url(UrlError::TlsFeatureNotEnabled)) => panic!("wss is not supported"),
            Err(_) => {}
            Ok(_) => panic!("unexpected connection"),
        }
    }

    #[test]
    fn test_poll_policy_from_config() {
        let policy = poll_policy(&ReconcileConfig::default());
        assert_eq!(policy, PollPolicy::default());
    }

    #[test]
    fn test_summary_line() {
        let order: Order = serde_json::from_value(json!({
            "id": "o1",
            "userId": "u1",
            "items": [],
            "shippingAddress": {},
            "paymentMethod": "cod",
            "totalAmount": 10,
            "status": "shipped",
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-01T00:00:00Z"
        }))
        .unwrap();

        let mut board = OrderBoard::new(BoardScope::Customer("u1".into()));
        board.apply_snapshot(Vec::new());
        assert!(board.apply_event(&OrderEvent::OrderCreated(order)));
        assert_eq!(summarize(&board), "1 orders | shipped 1");

        board.mark_fetch_failed("connection refused");
        assert_eq!(summarize(&board), "1 orders | shipped 1 | stale: connection refused");
    }
}
