//! A stateful stand-in for the note service's revision/deltas/patch wire
//! surface, grounded on `notetun_transport::client`'s wire shapes
//! (`RevisionResponse`, `DeltasResponse`, `DeltaChange`, `FieldChange`).
//!
//! `wiremock`'s `Mock` only serves fixed responses; the deltas feed needs
//! to replay history relative to whatever `base_revision` the caller
//! polled with, so each PATCH appends a snapshot of the write rather than
//! mutating one "current" map — a later clear must never retroactively
//! erase an earlier poller's view of what a revision contained.

use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

struct LogEntry {
    revision: u64,
    record_id: String,
    title: String,
    snippet: String,
}

struct MockState {
    revision: u64,
    log: Vec<LogEntry>,
}

#[derive(Deserialize)]
struct PatchBody {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

pub struct MockNoteService {
    server: MockServer,
}

impl MockNoteService {
    pub fn base_url(&self) -> String {
        self.server.uri()
    }
}

/// Start the mock and register its three endpoints against `initial_revision`.
pub async fn start(initial_revision: u64) -> MockNoteService {
    let server = MockServer::start().await;
    let state = Arc::new(Mutex::new(MockState {
        revision: initial_revision,
        log: Vec::new(),
    }));

    {
        let state = state.clone();
        Mock::given(method("GET"))
            .and(path("/data/app/databases/.ext.yanotes@notes"))
            .respond_with(move |_req: &Request| {
                let st = state.lock().unwrap();
                ResponseTemplate::new(200).set_body_json(json!({ "revision": st.revision }))
            })
            .mount(&server)
            .await;
    }

    {
        let state = state.clone();
        Mock::given(method("GET"))
            .and(path("/data/app/databases/.ext.yanotes@notes/deltas"))
            .respond_with(move |req: &Request| {
                let base_revision: u64 = req
                    .url
                    .query_pairs()
                    .find(|(k, _)| k == "base_revision")
                    .and_then(|(_, v)| v.parse().ok())
                    .unwrap_or(0);

                let st = state.lock().unwrap();
                let items: Vec<_> = st
                    .log
                    .iter()
                    .filter(|e| e.revision > base_revision)
                    .map(|e| {
                        json!({
                            "changes": [{
                                "change_type": "update",
                                "record_id": e.record_id,
                                "changes": [
                                    {"field_id": "title", "value": {"string": e.title}},
                                    {"field_id": "snippet", "value": {"string": e.snippet}},
                                ],
                            }],
                        })
                    })
                    .collect();

                ResponseTemplate::new(200).set_body_json(json!({
                    "revision": st.revision,
                    "items": items,
                }))
            })
            .mount(&server)
            .await;
    }

    {
        let state = state.clone();
        Mock::given(method("PATCH"))
            .and(path_regex(r"^/notes/notes/[^/]+$"))
            .respond_with(move |req: &Request| {
                let record_id = req
                    .url
                    .path()
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                let body: PatchBody = serde_json::from_slice(&req.body).unwrap_or(PatchBody {
                    title: String::new(),
                    snippet: String::new(),
                });

                let mut st = state.lock().unwrap();
                st.revision += 1;
                let revision = st.revision;
                st.log.push(LogEntry {
                    revision,
                    record_id,
                    title: body.title,
                    snippet: body.snippet,
                });

                ResponseTemplate::new(200).set_body_json(json!({}))
            })
            .mount(&server)
            .await;
    }

    MockNoteService { server }
}
