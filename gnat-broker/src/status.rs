use std::net::SocketAddr;

use tokio::sync::mpsc::Sender;
use tokio::sync::oneshot;
use warp::http::StatusCode;
use warp::Filter;

use crate::commands::StatusToRouterCmd;
use crate::router::StatusSnapshot;

/// The page the root path serves: nothing but a poller for `/mqtt_data`.
const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>gnat broker</title></head>
<body>
<h1>gnat broker</h1>
<pre id="data">loading...</pre>
<script>
async function poll() {
  try {
    const resp = await fetch('/mqtt_data');
    document.getElementById('data').textContent =
      JSON.stringify(await resp.json(), null, 2);
  } catch (err) {
    document.getElementById('data').textContent = String(err);
  }
}
poll();
setInterval(poll, 2000);
</script>
</body>
</html>
"#;

pub async fn serve(addr: SocketAddr, sender: Sender<StatusToRouterCmd>) {
    log::info!("Status endpoint listening at: http://{addr}");
    warp::serve(routes(sender)).run(addr).await;
}

fn routes(
    sender: Sender<StatusToRouterCmd>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let sender_filter = warp::any().map(move || sender.clone());

    let index = warp::get()
        .and(warp::path::end())
        .map(|| warp::reply::html(INDEX_HTML));

    let data = warp::get()
        .and(warp::path("mqtt_data"))
        .and(warp::path::end())
        .and(sender_filter)
        .and_then(get_snapshot);

    return index.or(data);
}

/// Round-trips a snapshot request through the router so the response is a
/// consistent view taken between MQTT events.
async fn get_snapshot(
    sender: Sender<StatusToRouterCmd>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (resp_tx, resp_rx) = oneshot::channel();

    if sender
        .send(StatusToRouterCmd::Snapshot(resp_tx))
        .await
        .is_ok()
    {
        if let Ok(snapshot) = resp_rx.await {
            return Ok(warp::reply::with_status(
                warp::reply::json(&snapshot),
                StatusCode::OK,
            ));
        }
    }

    log::error!("Status snapshot request failed; is the router gone?");
    Ok(warp::reply::with_status(
        warp::reply::json(&StatusSnapshot::default()),
        StatusCode::INTERNAL_SERVER_ERROR,
    ))
}
