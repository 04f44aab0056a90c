//! Dedicated threads owning `cpal` streams
//!
//! Streams are not `Send` on every backend, so each one lives on its own
//! thread until the owning handle is dropped.

use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::StreamTrait;

use crate::{Error, Result};

/// Keeps a device stream alive; dropping it stops the stream
#[derive(Debug)]
pub struct DeviceThread {
    stop: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceThread {
    /// Build and start a stream on a new thread
    ///
    /// `build` runs on the device thread; its extra value is handed back once
    /// the stream is playing.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `build`, or an audio error if the stream
    /// cannot be started
    pub fn spawn<T, F>(name: &str, build: F) -> Result<(Self, T)>
    where
        F: FnOnce() -> Result<(cpal::Stream, T)> + Send + 'static,
        T: Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<T>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let (stream, value) = match build() {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(Error::Audio(e.to_string())));
                    return;
                }

                if ready_tx.send(Ok(value)).is_err() {
                    return;
                }

                // Blocks until stopped or the handle is dropped
                let _ = stop_rx.recv();
                drop(stream);
            })?;

        let value = ready_rx
            .recv()
            .map_err(|_| Error::Audio(format!("{name} thread exited before starting")))??;

        tracing::debug!(thread = name, "device stream started");

        Ok((
            Self {
                stop: Some(stop_tx),
                thread: Some(thread),
            },
            value,
        ))
    }

    /// Stop the stream and wait for the thread to exit
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::warn!("device thread panicked");
        }
    }
}

impl Drop for DeviceThread {
    fn drop(&mut self) {
        self.stop();
    }
}
