//! TCP server that answers VISCA frames with a virtual camera.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ptz_visca::protocol::{decode_command, FrameReader};
use ptz_visca::transport::mock::VirtualCamera;
use ptz_visca::DialectKind;

/// Server configuration from command-line arguments.
pub struct SimulatorServerConfig {
    pub bind: SocketAddr,
    pub dialect: DialectKind,
    /// Delay before each reply, to mimic slow firmware.
    pub reply_delay: Duration,
    /// Accept and read frames but never answer.
    pub silent: bool,
}

/// Run until `running` is cleared. Every client talks to the same camera.
pub fn run_server(config: SimulatorServerConfig, running: Arc<AtomicBool>) -> io::Result<()> {
    let listener = TcpListener::bind(config.bind)?;
    listener.set_nonblocking(true)?;
    log::info!(
        "virtual {} camera listening on {}",
        config.dialect,
        listener.local_addr()?
    );

    let camera = Arc::new(Mutex::new(VirtualCamera::new(config.dialect)));
    let config = Arc::new(config);
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                log::info!("client connected: {}", peer);
                let camera = Arc::clone(&camera);
                let config = Arc::clone(&config);
                let running = Arc::clone(&running);
                thread::spawn(move || {
                    if let Err(e) = serve_client(stream, &config, &camera, &running) {
                        log::warn!("client {}: {}", peer, e);
                    }
                    log::info!("client disconnected: {}", peer);
                });
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(20));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn serve_client(
    mut stream: TcpStream,
    config: &SimulatorServerConfig,
    camera: &Mutex<VirtualCamera>,
    running: &AtomicBool,
) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_millis(100)))?;
    stream.set_nodelay(true)?;

    let mut reader = FrameReader::new();
    let mut buf = [0u8; 256];
    while running.load(Ordering::SeqCst) {
        let n = match stream.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue
            }
            Err(e) => return Err(e),
        };
        reader.push(&buf[..n]);

        while let Some(frame) = reader.next_frame() {
            match decode_command(&frame) {
                Ok((address, body)) => {
                    log::debug!("<- addr {} {:02X?}", address, body)
                }
                Err(e) => log::warn!("bad frame {:02X?}: {}", frame, e),
            }
            if config.silent {
                continue;
            }
            let replies = camera
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .handle(&frame);
            for reply in replies {
                if !config.reply_delay.is_zero() {
                    thread::sleep(config.reply_delay);
                }
                log::debug!("-> {:02X?}", reply);
                stream.write_all(&reply)?;
            }
        }
    }
    Ok(())
}
