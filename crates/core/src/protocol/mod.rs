pub mod messages;

pub use messages::{
    AddRequest, EntryPayload, GossipMessage, ListRequest, ListResponse, RemoveRequest,
    StatusResponse,
};
