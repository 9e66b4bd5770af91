//! Client core for a game channel page: initial fetch, live subscriptions
//! and message sending, written against an injected [`Backend`].

pub mod backend;
pub mod error;
pub mod page;
pub mod remote;
pub mod stream;

pub use backend::Backend;
pub use error::{SyncError, SyncResult};
pub use page::{ChannelPage, Phase, SendOutcome, StateHandle, ViewState};
pub use remote::RemoteBackend;
pub use stream::{RowSender, RowStream, row_stream};
