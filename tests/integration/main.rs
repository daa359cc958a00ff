//! Integration tests against the note-transport pipeline and tunnel
//! engine, run with a mocked note service — no real network or Yandex
//! session required.

mod support;

mod note_service_round_trip;
mod stale_reaper;
mod tunnel_connect;
