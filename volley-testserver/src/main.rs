use std::net::SocketAddr;

use tokio::net::TcpListener;
use volley_testserver::{TestServerOptions, TestServerStats};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:0".parse()?;
    let mut opts = TestServerOptions::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:0")
                })?;
                bind_addr = addr.parse()?;
            }
            "--token-expires-in" => {
                let secs = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--token-expires-in requires seconds"))?;
                opts.token_expires_in = Some(secs.parse()?);
            }
            "-h" | "--help" => {
                eprintln!(
                    "volley-testserver\n\nUSAGE:\n  volley-testserver [--bind 127.0.0.1:0] [--token-expires-in SECS]\n\nOUTPUT:\n  Prints HTTP_URL=<url> and TOKEN_URL=<url> to stdout once ready."
                );
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }

    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    let app = volley_testserver::router(TestServerStats::default(), opts);

    println!("HTTP_URL=http://{addr}");
    println!("TOKEN_URL=http://{addr}{}", volley_testserver::PATH_TOKEN);

    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
    });
    serve.await?;
    Ok(())
}
