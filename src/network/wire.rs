//! JSON wire form of protocol messages.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Pass `value` through its wire form when `enabled`, otherwise hand it back.
pub fn transfer<T: Serialize + DeserializeOwned>(value: T, enabled: bool) -> Result<T> {
    if !enabled {
        return Ok(value);
    }
    decode(&encode(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExecutionState, RequestContinuation};
    use crate::model::{Direction, DirectionSet};
    use crate::query::ast::{dcont, fdirs, fgather, gquery};
    use crate::query::Request;
    use crate::Error;

    #[test]
    fn test_continuation_keeps_propagation_settings() {
        let mut state = ExecutionState::new(true);
        state.set_directional(DirectionSet::single(Direction::NE), 2);
        let request = Request::new(gquery(fgather("t"), dcont(fdirs(Direction::NE), 2)));
        let sent = RequestContinuation::new(request.clone(), state);

        let received = transfer(sent, true).unwrap();
        assert_eq!(received.request, request);
        assert_eq!(received.state.hops(), 1);
        assert_eq!(received.state.max_hops(), Some(2));
        assert!(received.state.is_asynchronous());
        // The processing-node view never travels.
        assert!(received.state.processing_node().id.is_empty());
    }

    #[test]
    fn test_garbage_is_a_wire_error() {
        let err = decode::<Request>(b"{not json").unwrap_err();
        assert!(matches!(err, Error::Wire(_)));
    }
}
