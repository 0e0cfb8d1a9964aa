//! TCP front end.
//!
//! One host at a time connects and streams command link bytes. Commands
//! are queued through the emulator's inlet as they decode; on every tick of
//! the processing period the queue is executed and the resulting frames
//! are written back on the same connection.

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::MissedTickBehavior;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::config::EmulatorConfig;
use crate::emulator::Emulator;
use crate::protocol::{CommandCodec, FrameCodec};
use crate::tracing::prelude::*;

/// Bind the configured address and serve until `shutdown` is cancelled.
pub async fn serve(config: EmulatorConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    let emulator = Emulator::from_config(&config);
    serve_on(listener, emulator, config.process_period, shutdown).await
}

/// Serve hosts connecting to `listener`, one after another.
pub async fn serve_on(
    listener: TcpListener,
    mut emulator: Emulator,
    period: Duration,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    info!(
        addr = %listener.local_addr()?,
        chip_id = emulator.chip_id(),
        mode = %emulator.output_mode(),
        "Listening for host."
    );

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted.context("Accept failed")?,
            _ = shutdown.cancelled() => break,
        };

        info!(%peer, "Host connected.");
        emulator.clear();
        match session(stream, &mut emulator, period, &shutdown).await {
            Ok(()) => info!(%peer, "Host disconnected."),
            Err(e) => warn!(%peer, "Session ended: {:#}", e),
        }
    }

    Ok(())
}

async fn session(
    stream: TcpStream,
    emulator: &mut Emulator,
    period: Duration,
    shutdown: &CancellationToken,
) -> anyhow::Result<()> {
    stream.set_nodelay(true)?;
    let (reader, writer) = stream.into_split();
    let mut commands = FramedRead::new(reader, CommandCodec::new());
    let mut frames = FramedWrite::new(writer, FrameCodec::new());
    let inlet = emulator.inlet();

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.next() => match command {
                Some(Ok(command)) => {
                    inlet.push(command);
                }
                Some(Err(e)) => return Err(e).context("Command link read failed"),
                None => {
                    // Answer what the host sent before it hung up.
                    flush_output(emulator, &mut frames).await?;
                    break;
                }
            },
            _ = ticker.tick() => flush_output(emulator, &mut frames).await?,
            _ = shutdown.cancelled() => break,
        }
    }

    let skipped = commands.decoder().skipped();
    if skipped > 0 {
        warn!(bytes = skipped, "Skipped undecodable command link bytes");
    }
    Ok(())
}

async fn flush_output<W>(
    emulator: &mut Emulator,
    frames: &mut FramedWrite<W, FrameCodec>,
) -> anyhow::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    emulator.process_queue();
    let output = emulator.take_frames();
    if output.is_empty() {
        return Ok(());
    }
    for frame in output {
        frames.feed(frame).await?;
    }
    frames.flush().await.context("Data link write failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::OutputMode;
    use crate::protocol::{Command, Frame, RdReg, SubFrame, Trigger, WrReg};
    use bytes::BytesMut;
    use tokio::io::AsyncWriteExt;

    type Running = (
        std::net::SocketAddr,
        CancellationToken,
        tokio::task::JoinHandle<anyhow::Result<()>>,
    );

    async fn start(emulator: Emulator) -> Running {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(serve_on(
            listener,
            emulator,
            Duration::from_millis(1),
            shutdown.clone(),
        ));
        (addr, shutdown, handle)
    }

    fn wire(commands: &[Command]) -> BytesMut {
        let mut buf = BytesMut::new();
        for command in commands {
            command.pack(&mut buf);
        }
        buf
    }

    async fn next_frame_matching<R, F>(reader: &mut FramedRead<R, FrameCodec>, mut want: F) -> Frame
    where
        R: tokio::io::AsyncRead + Unpin,
        F: FnMut(&Frame) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let frame = reader.next().await.unwrap().unwrap();
                if want(&frame) {
                    return frame;
                }
            }
        })
        .await
        .expect("timed out waiting for frame")
    }

    #[tokio::test]
    async fn register_read_over_tcp() {
        let mut emulator = Emulator::new(0, OutputMode::All);
        emulator.set_service_interval(1);
        let (addr, shutdown, handle) = start(emulator).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut reader = FramedRead::new(reader, FrameCodec::new());

        let read = Command::RdReg(RdReg::new(0, 41).unwrap());
        writer.write_all(&wire(&[Command::Sync, read])).await.unwrap();

        let frame = next_frame_matching(&mut reader, |frame| {
            matches!(frame, Frame::Register(reg) if !reg.slots[0].auto_read)
        })
        .await;
        let Frame::Register(reg) = frame else {
            unreachable!()
        };
        assert_eq!(reg.slots[0].address, 41);
        assert_eq!(reg.slots[0].value, 500);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn trigger_over_tcp_returns_hit() {
        let mut emulator = Emulator::new(0, OutputMode::DataOnly);
        emulator.set_seed(1);
        let (addr, shutdown, handle) = start(emulator).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut reader = FramedRead::new(reader, FrameCodec::new());

        let commands = [
            Command::WrReg(WrReg::new(0, 1, 3).unwrap()),
            Command::WrReg(WrReg::new(0, 2, 40).unwrap()),
            Command::WrReg(WrReg::new(0, 0, 0x0100).unwrap()),
            Command::Trigger(Trigger::new(0b1000, 17).unwrap()),
        ];
        // Split mid-command to exercise partial reads.
        let bytes = wire(&commands);
        writer.write_all(&bytes[..5]).await.unwrap();
        writer.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        writer.write_all(&bytes[5..]).await.unwrap();

        let frame = next_frame_matching(&mut reader, |frame| {
            matches!(frame, Frame::Data(data) if matches!(data.second, SubFrame::Hit(_)))
        })
        .await;
        let Frame::Data(data) = frame else {
            unreachable!()
        };
        let SubFrame::Hit(hit) = data.second else {
            unreachable!()
        };
        let pixels: Vec<_> = hit.pixels().collect();
        assert_eq!(pixels, vec![(7, 40, 4)]);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}
