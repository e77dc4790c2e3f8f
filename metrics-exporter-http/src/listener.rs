use std::net::SocketAddr;

use hyper::{
    body::Incoming, server::conn::http1::Builder as HyperHttpBuilder, service::service_fn, Request,
};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::{BuildError, ExporterError, ExporterFuture, HttpDriver};

struct HttpListeningExporter {
    driver: HttpDriver,
}

impl HttpListeningExporter {
    async fn serve(self, listener: std::net::TcpListener) -> Result<(), ExporterError> {
        let listener = TcpListener::from_std(listener)
            .map_err(|e| ExporterError::Listener { reason: e.to_string() })?;

        loop {
            let stream = match listener.accept().await {
                Ok((stream, remote)) => {
                    debug!(%remote, "accepted connection");
                    stream
                }
                Err(e) => {
                    warn!(error = %e, "error accepting connection, ignoring request");
                    continue;
                }
            };

            self.process_stream(stream);
        }
    }

    fn process_stream(&self, stream: TcpStream) {
        let driver = self.driver.clone();
        let service = service_fn(move |req: Request<Incoming>| {
            let response = driver.handle(&req);
            async move { Ok::<_, hyper::Error>(response) }
        });

        tokio::task::spawn(async move {
            if let Err(e) =
                HyperHttpBuilder::new().serve_connection(TokioIo::new(stream), service).await
            {
                warn!(error = %e, "error serving connection");
            }
        });
    }
}

/// Binds `listen_address` and returns the future serving `driver` on it.
///
/// Binding happens right away, so that address errors are reported before the future is polled.
pub(crate) fn new_http_listener(
    driver: HttpDriver,
    listen_address: SocketAddr,
) -> Result<ExporterFuture, BuildError> {
    let listener = std::net::TcpListener::bind(listen_address)
        .and_then(|listener| {
            listener.set_nonblocking(true)?;
            Ok(listener)
        })
        .map_err(|e| BuildError::FailedToCreateHttpListener {
            address: listen_address,
            reason: e.to_string(),
        })?;

    let exporter = HttpListeningExporter { driver };
    Ok(Box::pin(exporter.serve(listener)))
}
