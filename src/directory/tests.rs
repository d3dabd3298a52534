#[cfg(test)]
#[allow(clippy::module_inception)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use serde_json::Value;

    use crate::config::Config;
    use crate::directory::{
        DirectoryConfig, DirectoryError, HttpRoomDirectory, MemoryRoomDirectory, RoomDirectory,
        RoomFile,
    };
    use crate::log::{LogSink, NoopLogSink};
    use crate::signaling::RoomCode;

    /// Serves one canned reply and hands back the raw request it got.
    fn one_shot_server(status: &str, body: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let status = status.to_string();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request = String::new();
            let mut content_length = 0usize;
            let mut chunked = false;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                    break;
                }
                let lower = line.to_ascii_lowercase();
                if let Some(v) = lower.strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap();
                }
                chunked |= lower.starts_with("transfer-encoding:") && lower.contains("chunked");
                request.push_str(&line);
            }
            let mut body_in = vec![0u8; content_length];
            reader.read_exact(&mut body_in).unwrap();
            while chunked {
                let mut size_line = String::new();
                reader.read_line(&mut size_line).unwrap();
                let size = usize::from_str_radix(size_line.trim(), 16).unwrap();
                let mut chunk = vec![0u8; size + 2];
                reader.read_exact(&mut chunk).unwrap();
                chunk.truncate(size);
                body_in.extend(chunk);
                chunked = size > 0;
            }
            request.push_str("\r\n");
            request.push_str(&String::from_utf8_lossy(&body_in));

            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            stream.flush().unwrap();
            let _ = tx.send(request);
        });
        (format!("http://{addr}/api"), rx)
    }

    fn http(base: String) -> HttpRoomDirectory {
        let log: Arc<dyn LogSink> = Arc::new(NoopLogSink);
        HttpRoomDirectory::new(
            DirectoryConfig {
                base_url: base,
                timeout: Duration::from_secs(5),
            },
            log,
        )
    }

    fn report() -> RoomFile {
        RoomFile::new("report.pdf", 2048, "application/pdf")
    }

    #[test]
    fn memory_directory_allocates_distinct_codes() {
        let dir = MemoryRoomDirectory::new();
        let a = dir.create_room(&[report()]).unwrap();
        let b = dir.create_room(&[report()]).unwrap();
        assert_ne!(a, b);
        assert_eq!(dir.len(), 2);

        let info = dir.room_info(&a).unwrap();
        assert_eq!(info.code, Some(a.clone()));
        assert_eq!(info.files[0].name, "report.pdf");
        assert!(!info.files[0].id.is_empty());

        assert!(dir.remove(&a));
        assert!(matches!(dir.room_info(&a), Err(DirectoryError::Rejected(_))));
    }

    #[test]
    fn empty_rooms_and_empty_files_are_refused() {
        let dir = MemoryRoomDirectory::new();
        assert!(matches!(dir.create_room(&[]), Err(DirectoryError::Rejected(_))));
        assert!(matches!(
            dir.create_room(&[RoomFile::new("empty.txt", 0, "text/plain")]),
            Err(DirectoryError::Rejected(m)) if m.contains("empty.txt")
        ));
        assert!(dir.is_empty());
    }

    #[test]
    fn create_room_posts_the_file_list() {
        let (base, rx) = one_shot_server(
            "200 OK",
            r#"{"success":true,"code":"a1b2c3","message":"Room created successfully","files":[]}"#,
        );
        let code = http(base).create_room(&[report()]).unwrap();
        assert_eq!(code.as_str(), "A1B2C3");

        let request = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(request.starts_with("POST /api/create-room "));
        let (_, body) = request.split_once("\r\n\r\n").unwrap();
        let v: Value = serde_json::from_str(body).unwrap();
        assert_eq!(v["files"][0]["name"], "report.pdf");
        assert_eq!(v["files"][0]["type"], "application/pdf");
        assert_eq!(v["files"][0]["size"], 2048);
    }

    #[test]
    fn refusal_message_is_surfaced() {
        let (base, _rx) = one_shot_server(
            "400 Bad Request",
            r#"{"success":false,"message":"At least one file is required"}"#,
        );
        let err = http(base).create_room(&[report()]).unwrap_err();
        assert_eq!(err, DirectoryError::Rejected("At least one file is required".into()));
    }

    #[test]
    fn malformed_code_is_reported() {
        let (base, _rx) = one_shot_server("200 OK", r#"{"success":true,"code":"nope"}"#);
        let err = http(base).create_room(&[report()]).unwrap_err();
        assert_eq!(err, DirectoryError::InvalidCode("nope".into()));
    }

    #[test]
    fn room_info_reports_presence() {
        let (base, rx) = one_shot_server(
            "200 OK",
            r#"{"success":true,"message":"ok","exists":true,"sender_online":true,"receiver_online":false,"created_at":0}"#,
        );
        let code = RoomCode::parse("ZZ9900").unwrap();
        let info = http(base).room_info(&code).unwrap();
        assert_eq!(info.code, Some(code));
        assert!(info.initiator_online);
        assert!(!info.joiner_online);

        let request = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(request.starts_with("GET /api/room-info?code=ZZ9900 "));
    }

    #[test]
    fn room_info_reads_nested_room_files() {
        let (base, _rx) = one_shot_server(
            "200 OK",
            r#"{"success":true,"room":{"code":"ZZ9900","files":[{"name":"a.txt","size":3,"type":"text/plain"}]}}"#,
        );
        let info = http(base).room_info(&RoomCode::parse("ZZ9900").unwrap()).unwrap();
        assert_eq!(info.files.len(), 1);
        assert_eq!(info.files[0].to_file_info().mime_type, "text/plain");
    }

    #[test]
    fn missing_room_is_rejected() {
        let (base, _rx) = one_shot_server(
            "404 Not Found",
            r#"{"success":false,"message":"Room does not exist","exists":false}"#,
        );
        let err = http(base).room_info(&RoomCode::parse("ZZ9900").unwrap()).unwrap_err();
        assert!(matches!(err, DirectoryError::Rejected(m) if m == "Room does not exist"));
    }

    #[test]
    fn unreachable_directory_is_an_http_error() {
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let err = http(format!("http://127.0.0.1:{port}/api"))
            .create_room(&[report()])
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Http(_)));
    }

    #[test]
    fn directory_config_reads_its_section() {
        let cfg = Config::parse("[directory]\nbase_url = http://rooms.lan:9000/api/\ntimeout_ms = 2500\n").unwrap();
        let dc = DirectoryConfig::from_config(&cfg);
        assert_eq!(dc.base_url, "http://rooms.lan:9000/api");
        assert_eq!(dc.timeout, Duration::from_millis(2500));
        assert_eq!(DirectoryConfig::from_config(&Config::empty()), DirectoryConfig::default());
    }
}
