//! Websocket [`ChannelProvider`] for the hosted Realtime service.
//!
//! One background task owns the socket. `subscribe`/`unsubscribe` only queue
//! commands for it, so both return immediately; join replies, errors and row
//! changes are routed back to each channel's sink by topic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use medidash_core::realtime::protocol::{channel_topic, Frame, Inbound, PHOENIX_TOPIC};
use medidash_core::realtime::{
    ChannelError, ChannelEvent, ChannelProvider, ChannelRef, ChannelSignal, EventSink,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Writer = SplitSink<Socket, Message>;
type Reader = SplitStream<Socket>;

#[derive(Debug, Clone)]
pub struct RealtimeOptions {
    pub ws_url: String,
    pub schema: String,
    pub heartbeat: Duration,
    pub join_timeout: Duration,
    pub reconnect_delay: Duration,
}

impl RealtimeOptions {
    pub fn new(ws_url: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            schema: schema.into(),
            heartbeat: Duration::from_secs(30),
            join_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(2),
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_join_timeout(mut self, join_timeout: Duration) -> Self {
        self.join_timeout = join_timeout;
        self
    }

    pub fn with_reconnect_delay(mut self, reconnect_delay: Duration) -> Self {
        self.reconnect_delay = reconnect_delay;
        self
    }
}

#[derive(Debug)]
enum Command {
    Join {
        id: u64,
        table: String,
        sink: EventSink,
    },
    Leave {
        id: u64,
    },
}

/// Handle to the realtime socket task. Dropping every handle stops the task.
#[derive(Debug)]
pub struct RealtimeClient {
    commands: mpsc::UnboundedSender<Command>,
    next_id: AtomicU64,
}

impl RealtimeClient {
    /// Spawns the socket task. Must be called inside a tokio runtime.
    pub fn connect(options: RealtimeOptions) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(options, rx));
        Self {
            commands,
            next_id: AtomicU64::new(1),
        }
    }
}

impl ChannelProvider for RealtimeClient {
    fn subscribe(&self, table: &str, sink: EventSink) -> Result<ChannelRef, ChannelError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.commands
            .send(Command::Join {
                id,
                table: table.to_string(),
                sink,
            })
            .map_err(|_| ChannelError::Disconnected)?;
        Ok(ChannelRef::new(id, table))
    }

    fn unsubscribe(&self, channel: ChannelRef) -> Result<(), ChannelError> {
        self.commands
            .send(Command::Leave { id: channel.id() })
            .map_err(|_| ChannelError::Disconnected)
    }
}

struct Channel {
    table: String,
    topic: String,
    sink: EventSink,
    join_ref: Option<String>,
    join_deadline: Option<Instant>,
}

impl Channel {
    /// Returns false once the bridge side has gone away.
    fn emit(&self, event: ChannelEvent) -> bool {
        self.sink.send(event).is_ok()
    }
}

struct Session {
    options: RealtimeOptions,
    channels: HashMap<u64, Channel>,
    next_ref: u64,
}

enum Exit {
    /// Every client handle was dropped.
    Shutdown,
    /// The socket closed or failed.
    Lost,
}

async fn run(options: RealtimeOptions, mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut session = Session {
        options,
        channels: HashMap::new(),
        next_ref: 0,
    };

    loop {
        match connect_async(session.options.ws_url.as_str()).await {
            Ok((socket, _)) => {
                tracing::info!("Realtime connected");
                let (writer, reader) = socket.split();
                match session.serve(writer, reader, &mut commands).await {
                    Exit::Shutdown => return,
                    Exit::Lost => tracing::warn!("Realtime connection lost"),
                }
            }
            Err(e) => tracing::warn!("Realtime connect failed: {}", e),
        }

        session.broadcast(ChannelSignal::ChannelError);

        // Keep taking commands while waiting to reconnect
        let retry_at = Instant::now() + session.options.reconnect_delay;
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => session.apply_offline(cmd),
                    None => return,
                },
                _ = sleep_until(retry_at) => break,
            }
        }
    }
}

impl Session {
    fn next_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    fn broadcast(&mut self, signal: ChannelSignal) {
        self.channels.retain(|_, channel| {
            channel.join_ref = None;
            channel.join_deadline = None;
            channel.emit(ChannelEvent::Status(signal))
        });
    }

    fn apply_offline(&mut self, cmd: Command) {
        match cmd {
            // Joined for real on reconnect
            Command::Join { id, table, sink } => {
                let channel = new_channel(id, table, sink);
                if channel.emit(ChannelEvent::Status(ChannelSignal::ChannelError)) {
                    self.channels.insert(id, channel);
                }
            }
            Command::Leave { id } => {
                self.channels.remove(&id);
            }
        }
    }

    async fn serve(
        &mut self,
        mut writer: Writer,
        mut reader: Reader,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Exit {
        // Rejoin everything known before the (re)connect
        let ids: Vec<u64> = self.channels.keys().copied().collect();
        for id in ids {
            if self.join(&mut writer, id).await.is_err() {
                return Exit::Lost;
            }
        }

        let mut heartbeat = interval(self.options.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        loop {
            let deadline = self
                .channels
                .values()
                .filter_map(|c| c.join_deadline)
                .min();

            tokio::select! {
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else {
                        self.leave_all(&mut writer).await;
                        let _ = writer.send(Message::Close(None)).await;
                        return Exit::Shutdown;
                    };
                    if self.command(&mut writer, cmd).await.is_err() {
                        return Exit::Lost;
                    }
                }
                msg = reader.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(stale) = self.route(text.as_str()) {
                            if send_frame(&mut writer, &Frame::leave(&stale, &self.next_ref())).await.is_err() {
                                return Exit::Lost;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Exit::Lost,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("Realtime socket error: {}", e);
                        return Exit::Lost;
                    }
                },
                _ = heartbeat.tick() => {
                    let frame = Frame::heartbeat(&self.next_ref());
                    if send_frame(&mut writer, &frame).await.is_err() {
                        return Exit::Lost;
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.expire_joins();
                }
            }
        }
    }

    async fn command(&mut self, writer: &mut Writer, cmd: Command) -> Result<(), ()> {
        match cmd {
            Command::Join { id, table, sink } => {
                self.channels.insert(id, new_channel(id, table, sink));
                self.join(writer, id).await
            }
            Command::Leave { id } => match self.channels.remove(&id) {
                Some(channel) => {
                    tracing::debug!("Leaving {}", channel.topic);
                    let frame = Frame::leave(&channel.topic, &self.next_ref());
                    send_frame(writer, &frame).await
                }
                None => Ok(()),
            },
        }
    }

    async fn join(&mut self, writer: &mut Writer, id: u64) -> Result<(), ()> {
        let msg_ref = self.next_ref();
        let deadline = Instant::now() + self.options.join_timeout;
        let Some(channel) = self.channels.get_mut(&id) else {
            return Ok(());
        };
        channel.join_ref = Some(msg_ref.clone());
        channel.join_deadline = Some(deadline);
        let frame = Frame::join(&channel.topic, &self.options.schema, &channel.table, &msg_ref);
        tracing::debug!("Joining {}", channel.topic);
        send_frame(writer, &frame).await
    }

    async fn leave_all(&mut self, writer: &mut Writer) {
        let topics: Vec<String> = self.channels.drain().map(|(_, c)| c.topic).collect();
        for topic in topics {
            let frame = Frame::leave(&topic, &self.next_ref());
            let _ = send_frame(writer, &frame).await;
        }
    }

    fn expire_joins(&mut self) {
        let now = Instant::now();
        self.channels.retain(|_, channel| match channel.join_deadline {
            Some(deadline) if deadline <= now => {
                tracing::warn!("Join timed out for {}", channel.topic);
                channel.join_deadline = None;
                channel.emit(ChannelEvent::Status(ChannelSignal::TimedOut))
            }
            _ => true,
        });
    }

    /// Delivers one inbound frame. Returns a topic to leave when its
    /// channel's sink has been dropped.
    fn route(&mut self, text: &str) -> Option<String> {
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("Ignoring undecodable frame: {}", e);
                return None;
            }
        };
        if frame.topic == PHOENIX_TOPIC {
            return None;
        }

        let (&id, channel) = self
            .channels
            .iter_mut()
            .find(|(_, c)| c.topic == frame.topic)?;

        let delivered = match frame.classify() {
            Inbound::Reply { msg_ref, ok } => {
                if channel.join_ref.as_deref() != Some(msg_ref.as_str()) {
                    return None;
                }
                channel.join_ref = None;
                channel.join_deadline = None;
                let signal = if ok {
                    ChannelSignal::Subscribed
                } else {
                    tracing::warn!("Join rejected for {}: {}", channel.topic, frame.payload);
                    ChannelSignal::ChannelError
                };
                channel.emit(ChannelEvent::Status(signal))
            }
            Inbound::Signal(signal) => channel.emit(ChannelEvent::Status(signal)),
            Inbound::Change { table, kind } => channel.emit(ChannelEvent::change(table, kind)),
            Inbound::Ignored => true,
        };

        if delivered {
            None
        } else {
            self.channels.remove(&id).map(|c| c.topic)
        }
    }
}

fn new_channel(id: u64, table: String, sink: EventSink) -> Channel {
    Channel {
        topic: channel_topic(&table, id),
        table,
        sink,
        join_ref: None,
        join_deadline: None,
    }
}

async fn send_frame(writer: &mut Writer, frame: &Frame) -> Result<(), ()> {
    let text = match frame.encode() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to encode {} frame: {}", frame.event, e);
            return Ok(());
        }
    };
    writer.send(Message::Text(text.into())).await.map_err(|e| {
        tracing::warn!("Realtime send failed: {}", e);
    })
}
