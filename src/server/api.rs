//! REST API implementation using rouille.
//!
//! POST handlers turn the request into an `Input` and push it to the control
//! thread. `GET /api/status` sends a reply channel along and waits for the
//! answer. CORS headers are added to all responses for browser access.

use std::io;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Sender, bounded};
use log::{error, info};
use rouille::{Request, Response};
use serde::{Deserialize, Serialize};

use crate::input::{Command, EmailKey, Input};

/// How long `GET /api/status` waits for the control thread.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(1);

/// Largest slide count `/api/jump/{k}` accepts in either direction.
pub const MAX_JUMP: i64 = 1000;

/// Request body for typing into the email prompt
#[derive(Debug, Deserialize)]
struct TypeRequest {
    text: String,
}

/// Generic API response
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn ok() -> Self {
        Self { success: true, message: None, error: None }
    }

    fn ok_msg(msg: &str) -> Self {
        Self { success: true, message: Some(msg.to_string()), error: None }
    }

    fn err(msg: &str) -> Self {
        Self { success: false, message: None, error: Some(msg.to_string()) }
    }
}

/// REST API server
pub struct ApiServer {
    port: u16,
    input_tx: Sender<Input>,
}

impl ApiServer {
    /// Start the API server in a background thread.
    pub fn start(port: u16, input_tx: Sender<Input>) -> io::Result<()> {
        let server = ApiServer { port, input_tx };
        thread::Builder::new()
            .name("frameloop-api".to_string())
            .spawn(move || server.run())?;
        Ok(())
    }

    fn run(self) {
        let addr = format!("0.0.0.0:{}", self.port);
        info!("API server starting on http://{}", addr);

        let tx = self.input_tx;
        match rouille::Server::new(&addr, move |request| Self::handle_request(request, &tx)) {
            Ok(server) => server.run(),
            Err(e) => error!("API server failed to bind {}: {}", addr, e),
        }
    }

    fn handle_request(request: &Request, tx: &Sender<Input>) -> Response {
        // Handle preflight
        if request.method() == "OPTIONS" {
            return Response::empty_204()
                .with_additional_header("Access-Control-Allow-Origin", "*")
                .with_additional_header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
                .with_additional_header("Access-Control-Allow-Headers", "Content-Type");
        }

        let response = match request.method() {
            "GET" => Self::handle_get(request, tx),
            "POST" => Self::handle_post(request, tx),
            _ => Response::json(&ApiResponse::err("Method not allowed")).with_status_code(405),
        };

        response.with_additional_header("Access-Control-Allow-Origin", "*")
    }

    fn handle_get(request: &Request, tx: &Sender<Input>) -> Response {
        match request.url().as_str() {
            "/api/health" => Response::json(&ApiResponse::ok_msg("frameloop API server")),
            "/api/status" => Self::get_status(tx),
            _ => not_found(),
        }
    }

    fn handle_post(request: &Request, tx: &Sender<Input>) -> Response {
        let path = request.url();

        // Paths with parameters
        if let Some(n) = path.strip_prefix("/api/rate/") {
            return match n.parse::<u8>() {
                Ok(rating @ 1..=5) => Self::send_command(tx, Command::Rate(rating)),
                _ => bad_request("Rating must be 1 to 5"),
            };
        }
        if let Some(deg) = path.strip_prefix("/api/rotate/") {
            return match deg.parse::<i32>() {
                Ok(degrees) if degrees % 90 == 0 && (-270..=270).contains(&degrees) => {
                    Self::send_command(tx, Command::Rotate(degrees))
                }
                _ => bad_request("Rotation must be a multiple of 90 up to 270"),
            };
        }
        if let Some(k) = path.strip_prefix("/api/jump/") {
            return match k.parse::<i64>() {
                Ok(k) if (-MAX_JUMP..=MAX_JUMP).contains(&k) => Self::send_command(tx, Command::Jump(k)),
                _ => bad_request("Invalid jump count"),
            };
        }
        if let Some(i) = path.strip_prefix("/api/email/suggestion/") {
            return match i.parse::<usize>() {
                Ok(i) => Self::send_command(tx, Command::EmailKey(EmailKey::Suggestion(i))),
                Err(_) => bad_request("Invalid suggestion index"),
            };
        }

        match path.as_str() {
            "/api/pause" => Self::send_command(tx, Command::TogglePause),
            "/api/email" => Self::send_command(tx, Command::PromptEmail),
            "/api/email/type" => Self::handle_type(request, tx),
            "/api/email/send" => Self::send_command(tx, Command::EmailKey(EmailKey::Enter)),
            "/api/email/cancel" => Self::send_command(tx, Command::EmailKey(EmailKey::Escape)),
            "/api/debug" => Self::send_command(tx, Command::ToggleDebug),
            "/api/aux" => Self::send_command(tx, Command::ToggleAuxPanel),
            "/api/ingest" => Self::send_command(tx, Command::ToggleIngest),
            "/api/quit" => Self::send_command(tx, Command::Quit),
            _ => not_found(),
        }
    }

    fn get_status(tx: &Sender<Input>) -> Response {
        let (reply_tx, reply_rx) = bounded(1);
        if tx.send(Input::Status(reply_tx)).is_err() {
            return Response::json(&ApiResponse::err("Show is not running")).with_status_code(503);
        }
        match reply_rx.recv_timeout(STATUS_TIMEOUT) {
            Ok(status) => Response::json(&status),
            Err(_) => Response::json(&ApiResponse::err("Timed out waiting for status"))
                .with_status_code(504),
        }
    }

    fn send_command(tx: &Sender<Input>, command: Command) -> Response {
        match tx.send(Input::Command(command)) {
            Ok(_) => Response::json(&ApiResponse::ok()),
            Err(e) => Response::json(&ApiResponse::err(&format!("Failed to send command: {}", e)))
                .with_status_code(500),
        }
    }

    fn handle_type(request: &Request, tx: &Sender<Input>) -> Response {
        match rouille::input::json_input::<TypeRequest>(request) {
            Ok(req) => {
                for c in req.text.chars() {
                    if let Some(key) = EmailKey::from_char(c) {
                        if tx.send(Input::Command(Command::EmailKey(key))).is_err() {
                            return Response::json(&ApiResponse::err("Show is not running"))
                                .with_status_code(503);
                        }
                    }
                }
                Response::json(&ApiResponse::ok())
            }
            Err(e) => bad_request(&format!("Invalid JSON: {}", e)),
        }
    }
}

fn bad_request(msg: &str) -> Response {
    Response::json(&ApiResponse::err(msg)).with_status_code(400)
}

fn not_found() -> Response {
    Response::json(&ApiResponse::err("Not found")).with_status_code(404)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::slideshow::StatusReport;
    use crossbeam_channel::unbounded;
    use std::io::Read;

    fn request(method: &str, url: &str) -> Response {
        let (tx, _rx) = unbounded();
        ApiServer::handle_request(&Request::fake_http(method, url, vec![], vec![]), &tx)
    }

    fn body(response: Response) -> String {
        let (mut reader, _) = response.data.into_reader_and_size();
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn test_health() {
        let response = request("GET", "/api/health");
        assert_eq!(response.status_code, 200);
        assert!(body(response).contains("frameloop"));
    }

    #[test]
    fn test_commands_forwarded() {
        let (tx, rx) = unbounded();
        for url in ["/api/pause", "/api/rate/5", "/api/rotate/-90", "/api/jump/-1", "/api/quit"] {
            let response =
                ApiServer::handle_request(&Request::fake_http("POST", url, vec![], vec![]), &tx);
            assert_eq!(response.status_code, 200, "{}", url);
        }

        let got: Vec<Command> = rx
            .try_iter()
            .filter_map(|input| match input {
                Input::Command(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(
            got,
            vec![
                Command::TogglePause,
                Command::Rate(5),
                Command::Rotate(-90),
                Command::Jump(-1),
                Command::Quit
            ]
        );
    }

    #[test]
    fn test_bad_parameters() {
        assert_eq!(request("POST", "/api/rate/9").status_code, 400);
        assert_eq!(request("POST", "/api/rotate/45").status_code, 400);
        assert_eq!(request("POST", "/api/jump/x").status_code, 400);
        assert_eq!(request("POST", "/api/rotate/2147483610").status_code, 400);
        assert_eq!(request("POST", "/api/rotate/360").status_code, 400);
        assert_eq!(request("POST", "/api/jump/9223372036854775807").status_code, 400);
        assert_eq!(request("POST", "/api/jump/-1001").status_code, 400);
        assert_eq!(request("POST", "/api/nope").status_code, 404);
        assert_eq!(request("GET", "/api/pause").status_code, 404);
    }

    #[test]
    fn test_type_text() {
        let (tx, rx) = unbounded();
        let req = Request::fake_http(
            "POST",
            "/api/email/type",
            vec![("Content-Type".to_string(), "application/json".to_string())],
            br#"{"text":"ab"}"#.to_vec(),
        );
        assert_eq!(ApiServer::handle_request(&req, &tx).status_code, 200);
        let keys: Vec<_> = rx.try_iter().collect();
        assert_eq!(keys.len(), 2);
        assert!(matches!(keys[0], Input::Command(Command::EmailKey(EmailKey::Char('a')))));
    }

    #[test]
    fn test_status_answered_by_control_thread() {
        let (tx, rx) = unbounded::<Input>();
        let control = thread::spawn(move || {
            if let Ok(Input::Status(reply)) = rx.recv() {
                let _ = reply.send(StatusReport::default());
            }
        });

        let response =
            ApiServer::handle_request(&Request::fake_http("GET", "/api/status", vec![], vec![]), &tx);
        control.join().unwrap();
        assert_eq!(response.status_code, 200);
        assert!(body(response).contains("\"paused\""));
    }

    #[test]
    fn test_status_without_control_thread() {
        let (tx, rx) = unbounded::<Input>();
        drop(rx);
        let response =
            ApiServer::handle_request(&Request::fake_http("GET", "/api/status", vec![], vec![]), &tx);
        assert_eq!(response.status_code, 503);
    }
}
