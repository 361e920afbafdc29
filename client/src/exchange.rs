//! One request/response exchange over a fresh TCP connection.
//!
//! The engine races this future against its deadline and shutdown signal, so
//! nothing here deals with timeouts or cancellation: dropping the future
//! drops the socket.

use std::io;
use std::net::SocketAddr;

use bytes::BytesMut;
use h1_core::{
    body_framing, build_request, find_head_end, parse_response_head, service_port, BodyFraming, ChunkedDecoder,
    RequestInfo, ResponseInfo, TargetForm,
};
use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};

use crate::config::ClientConfig;
use crate::engine::{EngineState, Shared};
use crate::error::RequestError;
use crate::hooks::ResponseHooks;

const READ_CHUNK: usize = 8 * 1024;

type ContentSink = dyn FnMut(&[u8]) -> Result<(), String> + Send;

pub(crate) async fn run(
    shared: &Shared,
    config: &ClientConfig,
    request: &RequestInfo,
    hooks: &mut ResponseHooks,
    response: &mut ResponseInfo,
) -> Result<(), RequestError> {
    let id = shared.id();
    let (form, host, service) = match &config.proxy {
        Some(proxy) => (TargetForm::Absolute, proxy.server.clone(), proxy.port.to_string()),
        None => (TargetForm::Origin, request.url.host.clone(), request.url.service()),
    };

    let wire = build_request(request, form);
    info!("[{id}] request_string:\r\n{}", String::from_utf8_lossy(&wire));

    shared.set_state(EngineState::Resolving);
    let addrs = resolve(&host, &service).await.map_err(|source| RequestError::Resolve {
        host: host.clone(),
        service: service.clone(),
        source,
    })?;
    debug!("[{id}] {host}:{service} resolved to {addrs:?}");

    shared.set_state(EngineState::Connecting);
    let mut stream = TcpStream::connect(&addrs[..]).await.map_err(|source| RequestError::Connect {
        host: host.clone(),
        service: service.clone(),
        source,
    })?;

    shared.set_state(EngineState::Sending);
    stream.write_all(&wire).await.map_err(|source| RequestError::Send {
        host: host.clone(),
        service: service.clone(),
        source,
    })?;

    shared.set_state(EngineState::ReadingHeaders);
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let head_end = read_head(&mut stream, &mut buf, config.max_header_bytes)
        .await
        .map_err(RequestError::RecvHeader)?;
    let head_bytes = buf.split_to(head_end);
    let raw_head = String::from_utf8_lossy(&head_bytes).into_owned();
    info!("[{id}] response header:\r\n{raw_head}");

    let head = match parse_response_head(&raw_head) {
        Ok(head) => head,
        Err(err) => {
            warn!("[{id}] {err}");
            return Err(RequestError::ParseHeader { raw: raw_head });
        }
    };
    response.apply_head(head);
    if let Some(hook) = hooks.on_headers.as_deref_mut() {
        hook(&*response).map_err(RequestError::HeadersRejected)?;
    }

    shared.set_state(EngineState::ReadingBody);
    let framing = body_framing(response.status_code, request.method, &response.headers);
    debug!("[{id}] body framing {framing:?}");

    let mut sink = BodySink {
        content: &mut response.content,
        hook: hooks.on_content.as_deref_mut(),
    };
    match framing {
        BodyFraming::None => Ok(()),
        BodyFraming::ContentLength(length) => read_length(&mut stream, buf, length, &mut sink).await,
        BodyFraming::CloseDelimited => read_to_close(&mut stream, buf, &mut sink).await,
        BodyFraming::Chunked => read_chunked(&mut stream, buf, &mut sink).await,
    }
}

async fn resolve(host: &str, service: &str) -> io::Result<Vec<SocketAddr>> {
    let port = service_port(service)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("unknown service {service}")))?;
    let addrs: Vec<SocketAddr> = lookup_host((host, port)).await?.collect();
    if addrs.is_empty() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "no addresses found"));
    }
    Ok(addrs)
}

/// Read until the head terminator; returns the offset just past it.
async fn read_head(stream: &mut TcpStream, buf: &mut BytesMut, max_header_bytes: usize) -> io::Result<usize> {
    loop {
        if let Some(end) = find_head_end(buf) {
            return Ok(end);
        }
        if buf.len() > max_header_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("response header exceeds {max_header_bytes} bytes"),
            ));
        }
        buf.reserve(READ_CHUNK);
        if stream.read_buf(buf).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before end of response header",
            ));
        }
    }
}

/// Body bytes go either to the content hook or into `ResponseInfo::content`.
struct BodySink<'a> {
    content: &'a mut Vec<u8>,
    hook: Option<&'a mut ContentSink>,
}

impl BodySink<'_> {
    fn push(&mut self, data: &[u8]) -> Result<(), RequestError> {
        if data.is_empty() {
            return Ok(());
        }
        match self.hook.as_deref_mut() {
            Some(hook) => hook(data).map_err(RequestError::ContentRejected),
            None => {
                self.content.extend_from_slice(data);
                Ok(())
            }
        }
    }
}

async fn fill(stream: &mut TcpStream, buf: &mut BytesMut) -> Result<usize, RequestError> {
    buf.clear();
    buf.reserve(READ_CHUNK);
    stream.read_buf(buf).await.map_err(RequestError::Body)
}

async fn read_length(
    stream: &mut TcpStream,
    mut buf: BytesMut,
    length: usize,
    sink: &mut BodySink<'_>,
) -> Result<(), RequestError> {
    let mut received = buf.len().min(length);
    sink.push(&buf[..received])?;
    while received < length {
        let n = fill(stream, &mut buf).await?;
        if n == 0 {
            return Err(RequestError::Body(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("connection closed after {received} of {length} content bytes"),
            )));
        }
        let take = n.min(length - received);
        sink.push(&buf[..take])?;
        received += take;
    }
    Ok(())
}

async fn read_to_close(stream: &mut TcpStream, mut buf: BytesMut, sink: &mut BodySink<'_>) -> Result<(), RequestError> {
    sink.push(&buf)?;
    while fill(stream, &mut buf).await? > 0 {
        sink.push(&buf)?;
    }
    Ok(())
}

async fn read_chunked(stream: &mut TcpStream, mut buf: BytesMut, sink: &mut BodySink<'_>) -> Result<(), RequestError> {
    let mut decoder = ChunkedDecoder::new();
    sink.push(&decoder.feed(&buf))?;
    while !decoder.is_complete() {
        if fill(stream, &mut buf).await? == 0 {
            return Err(RequestError::Body(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before the last chunk",
            )));
        }
        sink.push(&decoder.feed(&buf))?;
    }
    Ok(())
}
