// WebSocket transport for the remote collection

use crate::remote::{RemoteCollection, RemoteError, RemoteResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use protocol::{ClientMessage, Employee, NewEmployee, Reply, Request, ServerMessage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// `RemoteCollection` over the `/ws` endpoint. Replies are routed to their
/// caller by `request_id`, so any number of calls may be in flight.
pub struct WsCollection {
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    pending: Pending,
    // Set once either socket half is gone; checked under the `pending` lock
    closed: Arc<AtomicBool>,
    next_request_id: AtomicU64,
    request_timeout: Duration,
    send_task: JoinHandle<()>,
    recv_task: JoinHandle<()>,
}

impl WsCollection {
    pub async fn connect(url: &str, request_timeout: Duration) -> Result<Self> {
        let (ws_stream, _) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to {url}"))?;
        tracing::info!("Connected to collection endpoint at {}", url);

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        // Spawn task to send requests to the server
        let pending_for_send = pending.clone();
        let closed_for_send = closed.clone();
        let send_task = tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!("Failed to serialize request {}: {}", msg.request_id, e);
                        continue;
                    }
                };
                if let Err(e) = ws_tx.send(Message::Text(json.into())).await {
                    tracing::warn!("Failed to send request {}: {}", msg.request_id, e);
                    break;
                }
            }

            shut_down(&pending_for_send, &closed_for_send).await;
        });

        // Spawn task to route replies back to their callers
        let pending_for_recv = pending.clone();
        let closed_for_recv = closed.clone();
        let recv_task = tokio::spawn(async move {
            while let Some(Ok(msg)) = ws_rx.next().await {
                let text = match msg {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };

                let server_msg = match serde_json::from_str::<ServerMessage>(text.as_str()) {
                    Ok(server_msg) => server_msg,
                    Err(e) => {
                        tracing::warn!("Failed to parse server message: {}", e);
                        continue;
                    }
                };

                let waiter = pending_for_recv.lock().await.remove(&server_msg.request_id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(server_msg.reply);
                    }
                    None => tracing::warn!(
                        "Dropping reply for unknown request {}",
                        server_msg.request_id
                    ),
                }
            }

            shut_down(&pending_for_recv, &closed_for_recv).await;
            tracing::info!("Connection to collection endpoint closed");
        });

        Ok(WsCollection {
            outgoing,
            pending,
            closed,
            // 0 is reserved for replies to unparseable frames
            next_request_id: AtomicU64::new(1),
            request_timeout,
            send_task,
            recv_task,
        })
    }

    /// True once the socket is gone. Every later call fails immediately.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn call(&self, request: Request) -> RemoteResult<Reply> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if self.is_closed() {
                return Err(closed());
            }
            pending.insert(request_id, tx);
        }

        tracing::trace!("request {}: {:?}", request_id, request);
        if self
            .outgoing
            .send(ClientMessage {
                request_id,
                request,
            })
            .is_err()
        {
            self.pending.lock().await.remove(&request_id);
            return Err(closed());
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(closed()),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(RemoteError::Transport(format!(
                    "request {} timed out after {:?}",
                    request_id, self.request_timeout
                )))
            }
        }
    }
}

impl Drop for WsCollection {
    fn drop(&mut self) {
        self.send_task.abort();
        self.recv_task.abort();
    }
}

// Mark the connection dead and fail whoever is still waiting
async fn shut_down(pending: &Pending, closed: &AtomicBool) {
    closed.store(true, Ordering::SeqCst);
    pending.lock().await.clear();
}

fn closed() -> RemoteError {
    RemoteError::Transport("connection closed".to_string())
}

fn unexpected(reply: Reply) -> RemoteError {
    RemoteError::Transport(format!("unexpected reply: {:?}", reply))
}

#[async_trait]
impl RemoteCollection for WsCollection {
    async fn list(&self, filter: Option<&str>) -> RemoteResult<Vec<Employee>> {
        let request = Request::List {
            name: filter.map(str::to_string),
        };
        match self.call(request).await? {
            Reply::Employees { employees } => Ok(employees),
            Reply::Error { kind, message } => Err(RemoteError::from_wire(kind, message, None)),
            other => Err(unexpected(other)),
        }
    }

    async fn get(&self, id: i64) -> RemoteResult<Employee> {
        match self.call(Request::Get { id }).await? {
            Reply::Employee { employee } => Ok(employee),
            Reply::Error { kind, message } => {
                Err(RemoteError::from_wire(kind, message, Some(id)))
            }
            other => Err(unexpected(other)),
        }
    }

    async fn create(&self, employee: NewEmployee) -> RemoteResult<Employee> {
        match self.call(Request::Create { employee }).await? {
            Reply::Employee { employee } => Ok(employee),
            Reply::Error { kind, message } => Err(RemoteError::from_wire(kind, message, None)),
            other => Err(unexpected(other)),
        }
    }

    async fn update(&self, employee: &Employee) -> RemoteResult<()> {
        let id = employee.id;
        let request = Request::Update {
            employee: employee.clone(),
        };
        match self.call(request).await? {
            Reply::Done => Ok(()),
            Reply::Error { kind, message } => {
                Err(RemoteError::from_wire(kind, message, Some(id)))
            }
            other => Err(unexpected(other)),
        }
    }

    async fn delete(&self, id: i64) -> RemoteResult<()> {
        match self.call(Request::Delete { id }).await? {
            Reply::Done => Ok(()),
            Reply::Error { kind, message } => {
                Err(RemoteError::from_wire(kind, message, Some(id)))
            }
            other => Err(unexpected(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::ErrorKind;
    use tokio::net::TcpListener;
    use tokio::time::Instant;
    use tokio_test::{assert_err, assert_ok};
    use tokio_tungstenite::accept_async;

    // Accepts one connection, reads `expect` requests, then answers them in
    // reverse order using `answer`.
    async fn reversing_server(expect: usize, answer: fn(&Request) -> Reply) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let mut received = Vec::new();
            while received.len() < expect {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let msg: ClientMessage = serde_json::from_str(text.as_str()).unwrap();
                        received.push(msg);
                    }
                    Some(Ok(_)) => continue,
                    _ => return,
                }
            }

            for msg in received.into_iter().rev() {
                let reply = ServerMessage {
                    request_id: msg.request_id,
                    reply: answer(&msg.request),
                };
                let json = serde_json::to_string(&reply).unwrap();
                ws.send(Message::Text(json.into())).await.unwrap();
            }

            // Keep the socket open until the client goes away
            while let Some(Ok(_)) = ws.next().await {}
        });

        format!("ws://{addr}")
    }

    fn answer_by_filter(request: &Request) -> Reply {
        match request {
            Request::List { name: Some(name) } if name == "Ma" => Reply::Employees {
                employees: vec![
                    Employee::new(15, "Magneta"),
                    Employee::new(16, "RubberMan"),
                    Employee::new(17, "Dynama"),
                    Employee::new(19, "Magma"),
                ],
            },
            Request::List { .. } => Reply::Employees {
                employees: vec![Employee::new(15, "Magneta")],
            },
            Request::Delete { .. } => Reply::error(ErrorKind::NotFound, "gone"),
            _ => Reply::Done,
        }
    }

    #[tokio::test]
    async fn test_out_of_order_replies_reach_their_callers() {
        let url = reversing_server(2, answer_by_filter).await;
        let collection = WsCollection::connect(&url, Duration::from_secs(5))
            .await
            .unwrap();

        let (broad, narrow) = tokio::join!(
            collection.list(Some("Ma")),
            collection.list(Some("Magn"))
        );

        assert_eq!(assert_ok!(broad).len(), 4);
        assert_eq!(assert_ok!(narrow), vec![Employee::new(15, "Magneta")]);
    }

    #[tokio::test]
    async fn test_not_found_reply_carries_the_id() {
        let url = reversing_server(1, answer_by_filter).await;
        let collection = WsCollection::connect(&url, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(collection.delete(15).await, Err(RemoteError::NotFound(15)));
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        // Waits for two requests, so the single one sent here is never answered
        let url = reversing_server(2, answer_by_filter).await;
        let collection = WsCollection::connect(&url, Duration::from_millis(100))
            .await
            .unwrap();

        let err = assert_err!(collection.get(15).await);
        assert!(matches!(err, RemoteError::Transport(_)));
        assert!(collection.pending.lock().await.is_empty());
    }

    // Accepts one connection, reads `after` requests without answering, then
    // closes the socket.
    async fn closing_server(after: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let mut received = 0;
            while received < after {
                match ws.next().await {
                    Some(Ok(Message::Text(_))) => received += 1,
                    Some(Ok(_)) => continue,
                    _ => return,
                }
            }
            let _ = ws.close(None).await;
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn test_calls_after_close_fail_immediately() {
        let url = closing_server(0).await;
        let collection = WsCollection::connect(&url, Duration::from_secs(5))
            .await
            .unwrap();

        let wait_closed = async {
            while !collection.is_closed() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        assert_ok!(tokio::time::timeout(Duration::from_secs(5), wait_closed).await);

        let started = Instant::now();
        let err = assert_err!(collection.list(None).await);
        assert_eq!(err, RemoteError::Transport("connection closed".to_string()));
        assert_err!(collection.delete(15).await);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(collection.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_call_fails_when_socket_closes() {
        let url = closing_server(1).await;
        let collection = WsCollection::connect(&url, Duration::from_secs(5))
            .await
            .unwrap();

        let started = Instant::now();
        let err = assert_err!(collection.get(15).await);
        assert_eq!(err, RemoteError::Transport("connection closed".to_string()));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(collection.is_closed());
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WsCollection::connect(&format!("ws://{addr}"), Duration::from_secs(1)).await;
        assert!(result.is_err());
    }
}
