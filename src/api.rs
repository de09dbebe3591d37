use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use chrono::{Local, NaiveTime};
use serde::Serialize;
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, info, warn};

use crate::history::BedtimeHistory;
use crate::prediction::{ComplicationData, ComplicationType, SleepPrediction};
use crate::settings::SleepSettings;
use crate::sleep::model::BedtimeRecord;
use crate::tips::Tips;

/// Snapshot served to watch-face clients. Predictions are recomputed per
/// request against the wall clock.
#[derive(Debug, Clone, Default)]
pub struct ApiSharedState {
    pub settings: SleepSettings,
    pub history: BedtimeHistory,
    pub next_alarm: Option<NaiveTime>,
}

impl ApiSharedState {
    pub fn new(
        settings: SleepSettings,
        history: BedtimeHistory,
        next_alarm: Option<NaiveTime>,
    ) -> Self {
        Self {
            settings,
            history,
            next_alarm,
        }
    }

    fn prediction_at(&self, now: NaiveTime) -> SleepPrediction {
        SleepPrediction::compute(
            &self.settings,
            self.next_alarm,
            now,
            self.history.average_bedtime(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

pub struct ApiServer {
    stop: Arc<AtomicBool>,
    http_join: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn start(config: ApiServerConfig, initial: ApiSharedState) -> Result<Self> {
        let bind = format!("{}:{}", config.bind_addr, config.port);
        let server = Server::http(&bind)
            .map_err(|err| anyhow::anyhow!("failed to start API server on {bind}: {err}"))?;
        info!(%bind, "sleep API listening");
        let state = Arc::new(Mutex::new(initial));
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);
        let http_join = thread::spawn(move || run_server_loop(server, state, stop_for_thread));

        Ok(Self {
            stop,
            http_join: Some(http_join),
        })
    }

    /// Blocks until the server loop exits.
    pub fn wait(mut self) {
        if let Some(join) = self.http_join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.http_join.take() {
            let _ = join.join();
        }
    }
}

fn run_server_loop(server: Server, state: Arc<Mutex<ApiSharedState>>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        match server.recv_timeout(Duration::from_millis(200)) {
            Ok(Some(request)) => handle_request(request, &state),
            Ok(None) => continue,
            Err(err) => {
                warn!(%err, "failed to receive request");
                continue;
            }
        }
    }
}

fn handle_request(request: tiny_http::Request, state: &Arc<Mutex<ApiSharedState>>) {
    if request.method() != &Method::Get {
        let _ = send_text(request, StatusCode(405), "method not allowed");
        return;
    }

    let Some(remote_addr) = request.remote_addr() else {
        let _ = send_text(request, StatusCode(400), "missing remote address");
        return;
    };
    if !is_local_network_ip(remote_addr.ip()) {
        let _ = send_text(request, StatusCode(403), "forbidden: local network only");
        return;
    }

    let url = request.url().to_string();
    let (path, query) = split_path_query(&url);

    let guard = match state.lock() {
        Ok(guard) => guard,
        Err(_) => {
            let _ = send_text(request, StatusCode(500), "internal state lock error");
            return;
        }
    };
    debug!(path, query, "api request");
    let now = Local::now().time();

    let result = match path {
        "/healthz" => send_text(request, StatusCode(200), "ok"),
        "/" | "/v1/prediction" => {
            #[derive(Serialize)]
            struct PredictionResponse {
                prediction: SleepPrediction,
                headline: String,
                status_line: String,
                quality_color: &'static str,
            }

            let prediction = guard.prediction_at(now);
            let payload = PredictionResponse {
                headline: prediction.headline(),
                status_line: prediction.status_line(),
                quality_color: prediction.quality.color_hex(),
                prediction,
            };
            send_json(request, StatusCode(200), &payload)
        }
        "/v1/complication" => {
            let kind = query_param(query, "type").unwrap_or("short_text");
            match ComplicationType::from_str(kind) {
                Ok(kind) => {
                    let data = if query_param(query, "preview").is_some() {
                        ComplicationData::preview(kind)
                    } else {
                        ComplicationData::build(guard.prediction_at(now).sleep_time, kind)
                    };
                    send_json(request, StatusCode(200), &data)
                }
                Err(message) => send_text(request, StatusCode(400), &message),
            }
        }
        "/v1/history" => {
            #[derive(Serialize)]
            struct HistoryResponse {
                count: usize,
                average_bedtime: Option<NaiveTime>,
                recent_average_bedtime: Option<NaiveTime>,
                bedtimes: Vec<Option<BedtimeRecord>>,
            }

            let payload = HistoryResponse {
                count: guard.history.len(),
                bedtimes: guard.history.newest_first(),
                average_bedtime: guard.history.average_bedtime(),
                recent_average_bedtime: guard.history.recent_average_bedtime(),
            };
            send_json(request, StatusCode(200), &payload)
        }
        "/v1/tips" => {
            let tips = Tips::collect(&guard.settings, guard.history.average_bedtime());
            send_json(request, StatusCode(200), &tips)
        }
        _ => send_text(request, StatusCode(404), "not found"),
    };
    if let Err(err) = result {
        warn!(path, %err, "failed to send response");
    }
}

fn send_json<T: Serialize>(
    request: tiny_http::Request,
    status: StatusCode,
    body: &T,
) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    let content_type = Header::from_str("Content-Type: application/json; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_data(payload)
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn send_text(request: tiny_http::Request, status: StatusCode, body: &str) -> Result<()> {
    let content_type = Header::from_str("Content-Type: text/plain; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_string(body.to_string())
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn split_path_query(url: &str) -> (&str, &str) {
    match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    }
}

fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (k, v) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        if k == key {
            return Some(v);
        }
    }
    None
}

fn is_local_network_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || is_ipv4_mapped_local(v6)
        }
    }
}

fn is_ipv4_mapped_local(v6: Ipv6Addr) -> bool {
    match v6.to_ipv4_mapped() {
        Some(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, TcpStream};

    use chrono::NaiveDate;

    use super::*;
    use crate::sleep::model::BedtimeSensor;

    fn get(port: u16, path: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        write!(
            stream,
            "GET {path} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n"
        )
        .expect("write request");
        let mut response = String::new();
        stream.read_to_string(&mut response).expect("read response");
        response
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .and_then(|listener| listener.local_addr())
            .map(|addr| addr.port())
            .expect("free port")
    }

    #[test]
    fn local_network_ip_filter_accepts_private_and_loopback() {
        assert!(is_local_network_ip(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
        assert!(is_local_network_ip(IpAddr::V4(Ipv4Addr::new(
            192, 168, 1, 44
        ))));
        assert!(is_local_network_ip(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(!is_local_network_ip(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))));
    }

    #[test]
    fn query_param_extracts_value() {
        let query = "type=long_text&preview";
        assert_eq!(query_param(query, "type"), Some("long_text"));
        assert_eq!(query_param(query, "preview"), Some(""));
        assert_eq!(query_param(query, "missing"), None);
    }

    #[test]
    fn serves_complication_and_history() {
        let timestamp = NaiveDate::from_ymd_opt(2026, 10, 15)
            .expect("date")
            .and_hms_opt(23, 20, 0)
            .expect("time");
        let history =
            BedtimeHistory::from_records(&[BedtimeRecord::new(timestamp, BedtimeSensor::Bedtime)]);
        let port = free_port();
        let server = ApiServer::start(
            ApiServerConfig {
                bind_addr: "127.0.0.1".to_string(),
                port,
            },
            ApiSharedState::new(SleepSettings::default(), history, None),
        )
        .expect("server starts");

        let health = get(port, "/healthz");
        assert!(health.starts_with("HTTP/1.1 200"));
        assert!(health.ends_with("ok"));

        let preview = get(port, "/v1/complication?type=long_text&preview=1");
        assert!(preview.contains(r#""type":"long_text""#));
        assert!(preview.contains(r#""text":"8h 5m""#));

        let bad = get(port, "/v1/complication?type=gauge");
        assert!(bad.starts_with("HTTP/1.1 400"));

        let live = get(port, "/v1/complication?type=ranged_value");
        assert!(live.starts_with("HTTP/1.1 200"));
        assert!(live.contains(r#""type":"ranged_value""#));
        assert!(live.contains(r#""min":0.0"#));
        assert!(live.contains(r#""content_description":"Sleep Prediction""#));

        let history = get(port, "/v1/history");
        assert!(history.contains(r#""count":1"#));
        assert!(history.contains(r#""average_bedtime":"23:20:00""#));
        assert!(history.contains(r#""recent_average_bedtime":"23:20:00""#));

        let missing = get(port, "/v1/nope");
        assert!(missing.starts_with("HTTP/1.1 404"));

        drop(server);
    }

    #[test]
    fn serves_prediction_and_tips() {
        let settings = SleepSettings {
            sunlight_minutes: 12,
            ..SleepSettings::default()
        };
        let port = free_port();
        let server = ApiServer::start(
            ApiServerConfig {
                bind_addr: "127.0.0.1".to_string(),
                port,
            },
            ApiSharedState::new(
                settings,
                BedtimeHistory::default(),
                NaiveTime::from_hms_opt(7, 30, 0),
            ),
        )
        .expect("server starts");

        for path in ["/", "/v1/prediction"] {
            let prediction = get(port, path);
            assert!(prediction.starts_with("HTTP/1.1 200"), "{path}");
            assert!(prediction.contains(r#""wake_time":"07:30:00""#), "{path}");
            assert!(prediction.contains(r#""wake_source":"SYSTEM_ALARM""#), "{path}");
            assert!(prediction.contains("7:30 AM wake up (alarm)"), "{path}");
            assert!(prediction.contains(r#""headline":""#), "{path}");
            assert!(prediction.contains(r##""quality_color":"#"##), "{path}");
        }

        let tips = get(port, "/v1/tips");
        assert!(tips.starts_with("HTTP/1.1 200"));
        assert!(tips.contains("You've achieved 12 minutes of sunlight"));
        assert!(tips.contains("No bedtime estimate, check tomorrow."));
        assert!(tips.contains(r#""fall_asleep":null"#));

        drop(server);
    }
}
