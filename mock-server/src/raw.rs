//! Scripted raw TCP peer.
//!
//! # Design
//! Every accepted connection reads one request (head plus any
//! content-length body), reports it on a channel, then plays the script:
//! a list of writes and pauses, followed by either closing the connection or
//! holding it open until the client hangs up. When the client hangs up on a
//! held connection the server reports that too, which lets tests observe that
//! the client really released its socket.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
enum Step {
    Send(Vec<u8>),
    Sleep(Duration),
}

/// What the peer does after the last step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    Close,
    Hold,
}

/// Behaviour of the raw peer for each connection.
#[derive(Debug, Clone)]
pub struct RawScript {
    steps: Vec<Step>,
    finish: Finish,
}

impl Default for RawScript {
    fn default() -> Self {
        Self::new()
    }
}

impl RawScript {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            finish: Finish::Close,
        }
    }

    /// Write these bytes.
    pub fn send(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.steps.push(Step::Send(bytes.into()));
        self
    }

    /// Pause before the next step.
    pub fn sleep(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Sleep(duration));
        self
    }

    /// Keep the connection open after the last step.
    pub fn hold(mut self) -> Self {
        self.finish = Finish::Hold;
        self
    }
}

/// A running raw peer bound to a random local port.
pub struct RawServer {
    pub addr: SocketAddr,
    requests: mpsc::UnboundedReceiver<Vec<u8>>,
    hangups: mpsc::UnboundedReceiver<()>,
    task: JoinHandle<()>,
}

impl RawServer {
    pub async fn spawn(script: RawScript) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (request_tx, requests) = mpsc::unbounded_channel();
        let (hangup_tx, hangups) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                debug!("raw peer accepted {peer}");
                let script = script.clone();
                let request_tx = request_tx.clone();
                let hangup_tx = hangup_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve(stream, script, request_tx, hangup_tx).await {
                        debug!("raw peer connection ended: {e}");
                    }
                });
            }
        });

        Ok(Self {
            addr,
            requests,
            hangups,
            task,
        })
    }

    /// `http://127.0.0.1:<port>` followed by `path`.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Next raw request received on any connection.
    pub async fn next_request(&mut self) -> Option<Vec<u8>> {
        self.requests.recv().await
    }

    /// Resolves when the client closes a held connection.
    pub async fn client_hung_up(&mut self) -> Option<()> {
        self.hangups.recv().await
    }
}

impl Drop for RawServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    script: RawScript,
    request_tx: mpsc::UnboundedSender<Vec<u8>>,
    hangup_tx: mpsc::UnboundedSender<()>,
) -> io::Result<()> {
    let request = read_request(&mut stream).await?;
    let _ = request_tx.send(request);

    for step in script.steps {
        match step {
            Step::Send(bytes) => stream.write_all(&bytes).await?,
            Step::Sleep(duration) => tokio::time::sleep(duration).await,
        }
    }

    match script.finish {
        Finish::Close => stream.shutdown().await,
        Finish::Hold => {
            let mut sink = [0u8; 1024];
            loop {
                match stream.read(&mut sink).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
            let _ = hangup_tx.send(());
            Ok(())
        }
    }
}

async fn read_request(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "client closed before request head"));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
    let body_len = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + body_len {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(buf)
}
