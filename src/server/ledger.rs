use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::protocol::message::{Response, StatusCode};

/// Records the distinct request ids the server actually received, keyed by
/// experiment id. Duplicate deliveries collapse into one entry; negative
/// ids are warm-up traffic and acknowledged without being recorded.
pub struct RequestLedger {
    name: String,
    entries: Mutex<HashMap<u64, HashSet<i64>>>,
}

impl RequestLedger {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Parses `"<experiment>:<request>"` (anything after the request-id
    /// digits is padding and ignored), records the id, and echoes the body
    /// back with Created. Malformed bodies get BadRequest and leave the
    /// ledger untouched.
    pub fn handle_post(&self, body: &[u8]) -> Response {
        let text = match std::str::from_utf8(body) {
            Ok(text) => text,
            Err(_) => return self.reject("body is not valid UTF-8"),
        };
        match parse_post_body(text) {
            Ok((experiment, request)) => {
                if request >= 0 {
                    let mut entries = self.entries.lock().expect("ledger lock poisoned");
                    let inserted = entries.entry(experiment).or_default().insert(request);
                    debug!(
                        resource = %self.name,
                        experiment,
                        request,
                        duplicate = !inserted,
                        "recorded request"
                    );
                } else {
                    debug!(resource = %self.name, experiment, request, "warm-up request acknowledged");
                }
                Response::new(StatusCode::CREATED, Bytes::copy_from_slice(body))
            }
            Err(reason) => self.reject(reason),
        }
    }

    /// Lists one `"<experiment>:<count>"` line per known experiment.
    pub fn handle_get(&self) -> Response {
        let entries = self.entries.lock().expect("ledger lock poisoned");
        let mut body = String::new();
        for (experiment, requests) in entries.iter() {
            body.push_str(&format!("{experiment}:{}\n", requests.len()));
        }
        Response::new(StatusCode::CONTENT, Bytes::from(body.into_bytes()))
    }

    /// Distinct request ids recorded for one experiment.
    pub fn count_for(&self, experiment: u64) -> usize {
        let entries = self.entries.lock().expect("ledger lock poisoned");
        entries.get(&experiment).map_or(0, HashSet::len)
    }

    fn reject(&self, reason: &str) -> Response {
        warn!(resource = %self.name, reason, "rejecting malformed post body");
        Response::new(StatusCode::BAD_REQUEST, Bytes::from_static(b"malformed request body"))
    }
}

fn parse_post_body(text: &str) -> Result<(u64, i64), &'static str> {
    let (experiment, rest) = text.split_once(':').ok_or("missing ':' separator")?;
    let experiment = experiment
        .parse::<u64>()
        .map_err(|_| "experiment id is not an unsigned integer")?;
    let mut end = 0;
    for (i, c) in rest.char_indices() {
        if c.is_ascii_digit() || c == '-' {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    let request = rest[..end]
        .parse::<i64>()
        .map_err(|_| "request id is not an integer")?;
    Ok((experiment, request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn duplicate_request_ids_count_once() {
        let ledger = RequestLedger::new("udp");
        for body in [b"7:0", b"7:1", b"7:2", b"7:1"] {
            let response = ledger.handle_post(body);
            assert_eq!(response.code, StatusCode::CREATED);
        }
        assert_eq!(ledger.count_for(7), 3);
    }

    #[test]
    fn warm_up_ids_are_acknowledged_but_not_recorded() {
        let ledger = RequestLedger::new("udp");
        let response = ledger.handle_post(b"7:-1");
        assert_eq!(response.code, StatusCode::CREATED);
        assert_eq!(ledger.count_for(7), 0);
    }

    #[test]
    fn padded_bodies_record_the_leading_pair() {
        let ledger = RequestLedger::new("udp");
        let response = ledger.handle_post(b"7:42\nsomePaddingAfterTheNewline");
        assert_eq!(response.code, StatusCode::CREATED);
        assert_eq!(response.payload.as_ref(), b"7:42\nsomePaddingAfterTheNewline");
        assert_eq!(ledger.count_for(7), 1);
    }

    #[test]
    fn malformed_bodies_leave_the_ledger_untouched() {
        let ledger = RequestLedger::new("udp");
        let bodies: [&[u8]; 7] = [
            b"no separator",
            b"x:1",
            b"7:notanumber",
            b"7:",
            b":1",
            b"-1:5",
            b"\xff\xfe:1",
        ];
        for body in bodies {
            let response = ledger.handle_post(body);
            assert_eq!(response.code, StatusCode::BAD_REQUEST, "body {body:?}");
        }
        assert_eq!(ledger.count_for(7), 0);
    }

    #[test]
    fn listing_reports_set_sizes() {
        let ledger = RequestLedger::new("tcp");
        for body in [b"1:0", b"1:1", b"2:0"] {
            ledger.handle_post(body);
        }
        let response = ledger.handle_get();
        assert_eq!(response.code, StatusCode::CONTENT);
        let text = String::from_utf8(response.payload.to_vec()).unwrap();
        let mut lines: Vec<&str> = text.lines().collect();
        lines.sort_unstable();
        assert_eq!(lines, vec!["1:2", "2:1"]);
    }

    #[test]
    fn experiments_are_isolated() {
        let ledger = RequestLedger::new("tls");
        ledger.handle_post(b"1:5");
        ledger.handle_post(b"2:5");
        assert_eq!(ledger.count_for(1), 1);
        assert_eq!(ledger.count_for(2), 1);
        assert_eq!(ledger.count_for(3), 0);
    }

    #[test]
    fn concurrent_posts_do_not_lose_entries() {
        let ledger = Arc::new(RequestLedger::new("udp"));
        let mut handles = Vec::new();
        for t in 0..4u64 {
            let ledger = Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    let body = format!("9:{}", t * 100 + i);
                    ledger.handle_post(body.as_bytes());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(ledger.count_for(9), 400);
    }
}
