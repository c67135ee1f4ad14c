use gridwire_core::id::{ConnectionPoint, NetworkId};
use gridwire_core::store::StoreError;

/// Errors from structural network operations.
///
/// These signal programmer errors in the calling host (unknown points,
/// reserved ids, unreachable joins). Runtime conditions such as full
/// batteries or missing producers never surface here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("network id 0 is reserved")]
    ReservedNetworkId,
    #[error("unknown network {0}")]
    UnknownNetwork(NetworkId),
    #[error("network id {0} is outside the assignable range")]
    IdOutOfRange(NetworkId),
    #[error("network ids exhausted")]
    IdsExhausted,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{point} is not wired to any member of {network}")]
    NotReachable {
        point: ConnectionPoint,
        network: NetworkId,
    },
    #[error("no wire between {a} and {b}")]
    NotWired {
        a: ConnectionPoint,
        b: ConnectionPoint,
    },
    #[error("cannot wire {0} to itself")]
    SelfLoop(ConnectionPoint),
    #[error("{point} already belongs to {network}")]
    AlreadyMember {
        point: ConnectionPoint,
        network: NetworkId,
    },
}
