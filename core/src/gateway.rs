use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chat_api::{
    Envelope, Kind, SendParams, METHOD_INIT, METHOD_SEND, METHOD_STOP, METHOD_SUBSCRIBE,
    TOPIC_HELLO, TOPIC_MESSAGE, TOPIC_TYPING, UNKNOWN_METHOD,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::{
    io::{AsyncBufRead, AsyncWrite},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    bot::Bot,
    chat::{ChatChannel, DeliveryError},
    clock::Clock,
    ipc::{read_envelope, write_envelope},
};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("chat gateway closed during the handshake")]
    ClosedDuringHandshake,
    #[error("expected {expected} from the chat gateway, got {got:?}")]
    UnexpectedEnvelope { expected: &'static str, got: Kind },
    #[error("chat gateway rejected {method}: {message}")]
    Rejected { method: &'static str, message: String },
}

/// Requests awaiting a response. `None` once the reader has stopped, so no
/// new request can wait on a response that will never be routed.
type Pending = Arc<Mutex<Option<HashMap<String, oneshot::Sender<Envelope>>>>>;
type SharedWriter<W> = Arc<tokio::sync::Mutex<W>>;

/// [`ChatChannel`] that posts `chat.send` requests through the gateway and
/// waits for the acknowledgement.
pub struct GatewayChannel<W> {
    writer: SharedWriter<W>,
    pending: Pending,
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ChatChannel for GatewayChannel<W> {
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), DeliveryError> {
        let id = Uuid::new_v4().to_string();
        let params = SendParams {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
        };
        let params =
            serde_json::to_value(params).map_err(|e| DeliveryError::Transport(e.to_string()))?;
        let (tx, rx) = oneshot::channel();
        match self.pending.lock().as_mut() {
            Some(map) => map.insert(id.clone(), tx),
            None => return Err(DeliveryError::Closed),
        };
        let written = {
            let mut w = self.writer.lock().await;
            write_envelope(&mut *w, &Envelope::request(id.clone(), METHOD_SEND, params)).await
        };
        if let Err(err) = written {
            if let Some(map) = self.pending.lock().as_mut() {
                map.remove(&id);
            }
            return Err(DeliveryError::Transport(err.to_string()));
        }
        let resp = rx.await.map_err(|_| DeliveryError::Closed)?;
        match resp.error {
            Some(err) => Err(DeliveryError::Rejected {
                code: err.code,
                message: err.message,
            }),
            None => Ok(()),
        }
    }
}

async fn expect_response<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    id: &str,
    method: &'static str,
) -> Result<Value> {
    let env = read_envelope(reader)
        .await?
        .ok_or(GatewayError::ClosedDuringHandshake)?;
    if env.kind != Kind::Response || env.id.as_deref() != Some(id) {
        return Err(GatewayError::UnexpectedEnvelope {
            expected: method,
            got: env.kind,
        }
        .into());
    }
    if let Some(err) = env.error {
        return Err(GatewayError::Rejected {
            method,
            message: err.message,
        }
        .into());
    }
    Ok(env.result.unwrap_or(Value::Null))
}

/// Run the bot side of the handshake: wait for `chat.hello`, then
/// `bot.init` and `event.subscribe`.
async fn handshake<R, W>(reader: &mut R, writer: &SharedWriter<W>, metadata: Value) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let hello = read_envelope(reader)
        .await?
        .ok_or(GatewayError::ClosedDuringHandshake)?;
    if !hello.is_event(TOPIC_HELLO) {
        return Err(GatewayError::UnexpectedEnvelope {
            expected: TOPIC_HELLO,
            got: hello.kind,
        }
        .into());
    }
    debug!("gateway hello: {:?}", hello.payload);

    let init_id = Uuid::new_v4().to_string();
    let init = Envelope::request(init_id.clone(), METHOD_INIT, json!({ "metadata": metadata }));
    write_envelope(&mut *writer.lock().await, &init).await?;
    expect_response(reader, &init_id, METHOD_INIT).await?;

    let sub_id = Uuid::new_v4().to_string();
    let sub = Envelope::request(
        sub_id.clone(),
        METHOD_SUBSCRIBE,
        json!({ "topics": [TOPIC_TYPING, TOPIC_MESSAGE] }),
    );
    write_envelope(&mut *writer.lock().await, &sub).await?;
    expect_response(reader, &sub_id, METHOD_SUBSCRIBE).await?;
    Ok(())
}

/// Route responses to their waiting callers and forward everything else to
/// the dispatch loop. Pending callers are released when the stream ends.
fn spawn_reader<R>(mut reader: R, pending: Pending, events: mpsc::UnboundedSender<Envelope>) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match read_envelope(&mut reader).await {
                Ok(Some(env)) if env.kind == Kind::Response => {
                    let tx = env.id.as_ref().and_then(|id| pending.lock().as_mut()?.remove(id));
                    match tx {
                        Some(tx) => {
                            let _ = tx.send(env);
                        }
                        None => debug!("dropping unsolicited response {:?}", env.id),
                    }
                }
                Ok(Some(env)) => {
                    if events.send(env).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    info!("chat gateway closed the connection");
                    break;
                }
                Err(err) => {
                    error!("error reading from chat gateway: {err:#}");
                    break;
                }
            }
        }
        pending.lock().take();
    })
}

/// Serve the bot over an established gateway connection until the gateway
/// closes it or asks the bot to stop.
pub async fn serve<R, W, C>(mut reader: R, writer: W, mut bot: Bot<C>) -> Result<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    C: Clock,
{
    let writer: SharedWriter<W> = Arc::new(tokio::sync::Mutex::new(writer));
    let metadata = serde_json::to_value(Bot::<C>::metadata())?;
    handshake(&mut reader, &writer, metadata)
        .await
        .context("gateway handshake failed")?;

    let pending: Pending = Arc::new(Mutex::new(Some(HashMap::new())));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let reader_task = spawn_reader(reader, pending.clone(), tx);
    let channel = GatewayChannel {
        writer: writer.clone(),
        pending,
    };

    while let Some(env) = rx.recv().await {
        match env.kind {
            Kind::Event => bot.handle_event(&env, &channel).await,
            Kind::Request if env.method.as_deref() == Some(METHOD_STOP) => {
                let resp = Envelope::response(env.id, json!({"ok": true}));
                let _ = write_envelope(&mut *writer.lock().await, &resp).await;
                info!("stop requested by chat gateway");
                break;
            }
            Kind::Request => {
                let method = env.method.unwrap_or_default();
                let resp = Envelope::error_response(
                    env.id,
                    UNKNOWN_METHOD,
                    format!("unknown method {method}"),
                );
                let _ = write_envelope(&mut *writer.lock().await, &resp).await;
            }
            Kind::Response => {}
        }
    }
    reader_task.abort();
    Ok(())
}
