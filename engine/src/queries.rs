use crate::{engine::REQUESTS, Engine, Error, Host, Params, ProofVerifier, State, TallyVm};
use oracle_primitives::{DataRequest, DataRequestIndex, Identity, RequestId, RevealBody, Status};
use oracle_store::{kv::Kv, requests::Page};

impl<D: Kv, H: Host, V: ProofVerifier, M: TallyVm> Engine<D, H, V, M> {
    pub fn get_request(&self, id: &RequestId) -> Result<DataRequest, Error> {
        Ok(REQUESTS.get(&self.db, id)?)
    }

    /// Reveal body submitted by `identity`, if any.
    pub fn get_reveal_body(
        &self,
        id: &RequestId,
        identity: &Identity,
    ) -> Result<Option<RevealBody>, Error> {
        Ok(REQUESTS.reveal_body(&self.db, id, identity)?)
    }

    /// Up to `limit` requests with `status`, highest priority first, resuming
    /// after `last_seen_index`.
    pub fn list_by_status(
        &self,
        status: Status,
        limit: usize,
        last_seen_index: Option<&DataRequestIndex>,
    ) -> Result<Page, Error> {
        Ok(REQUESTS.list_by_status(&self.db, status, limit, last_seen_index)?)
    }

    /// Status of each of `ids`, `None` for ids that are not tracked.
    pub fn get_statuses(&self, ids: &[RequestId]) -> Result<Vec<Option<Status>>, Error> {
        Ok(REQUESTS.statuses(&self.db, ids)?)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn state(&self) -> &State {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks;

    #[test]
    fn test_queries() {
        let (engine, id) = mocks::posted(1, 1, 10);
        assert_eq!(engine.get_request(&id).unwrap().status, Status::Committing);
        assert_eq!(
            engine
                .get_statuses(&[id, RequestId::new([0; 32])])
                .unwrap(),
            vec![Some(Status::Committing), None]
        );

        let page = engine.list_by_status(Status::Committing, 10, None).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.requests[0].id, id);
        let next = engine
            .list_by_status(Status::Committing, 10, page.last_seen_index.as_ref())
            .unwrap();
        assert!(next.requests.is_empty());
        assert_eq!(next.last_seen_index, None);

        let executor = &mocks::executors(1)[0];
        assert_eq!(
            engine.get_reveal_body(&id, &executor.identity).unwrap(),
            None
        );
    }
}
