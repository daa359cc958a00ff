//! `Unit`: the atomic piece of payload carried inside one `(title, data)`
//! pair inside one snippet line.

use bytes::Bytes;

use crate::title::{Direction, RequestId, UnitType};

/// One routable element: a title plus its decoded, decrypted payload.
///
/// `payload` is opaque application bytes, expected to be small (≤ ~8 KiB
/// effective, after encoding/encryption overhead) — the sender is the one
/// place that enforces the snippet-wide character budget; `Unit` itself
/// carries no size limit.
#[derive(Debug, Clone)]
pub struct Unit {
    pub direction: Direction,
    pub request_id: RequestId,
    pub chunk: u32,
    pub total: u32,
    pub unit_type: UnitType,
    pub payload: Bytes,
}

impl Unit {
    pub fn new(
        direction: Direction,
        request_id: RequestId,
        chunk: u32,
        total: u32,
        unit_type: UnitType,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            direction,
            request_id,
            chunk,
            total,
            unit_type,
            payload: payload.into(),
        }
    }

    /// A one-shot `RQST`/`RESP` unit: `chunk=1`, `total=1`.
    pub fn one_shot(
        direction: Direction,
        request_id: RequestId,
        unit_type: UnitType,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self::new(direction, request_id, 1, 1, unit_type, payload)
    }

    /// A streaming `DATA` unit: `total=0`.
    pub fn data_chunk(
        direction: Direction,
        request_id: RequestId,
        chunk: u32,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self::new(direction, request_id, chunk, 0, UnitType::Data, payload)
    }

    pub fn title(&self) -> crate::title::Title {
        crate::title::Title {
            direction: self.direction,
            request_id: self.request_id.clone(),
            chunk: self.chunk,
            total: self.total,
            unit_type: self.unit_type,
        }
    }

    /// Key used to group chunks/complete messages for this unit's request
    /// and type, e.g. for the inbox's `complete`/`chunks` maps.
    pub fn inbox_key(&self) -> String {
        format!("{}:{}", self.request_id, self.unit_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_unit_has_chunk_and_total_of_one() {
        let u = Unit::one_shot(
            Direction::ClientToWorker,
            RequestId::new(1700000000000),
            UnitType::Rqst,
            &b"hello"[..],
        );
        assert_eq!(u.chunk, 1);
        assert_eq!(u.total, 1);
    }

    #[test]
    fn data_chunk_has_total_zero() {
        let u = Unit::data_chunk(
            Direction::WorkerToClient,
            RequestId::new(1700000000000),
            7,
            &b"bytes"[..],
        );
        assert_eq!(u.total, 0);
        assert_eq!(u.chunk, 7);
    }

    #[test]
    fn title_round_trips_unit_fields() {
        let id = RequestId::new(1700000000000);
        let u = Unit::new(
            Direction::ClientToWorker,
            id.clone(),
            3,
            5,
            UnitType::Data,
            &b"x"[..],
        );
        let title = u.title();
        assert_eq!(title.request_id, id);
        assert_eq!(title.chunk, 3);
        assert_eq!(title.total, 5);
    }
}
