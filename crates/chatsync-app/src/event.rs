//! Application input events.
//!
//! Every [`AppEvent`] is either the completion of an [`crate::AppAction`] the
//! runtime carried out, or a connection lifecycle event.

use chatsync_client::FetchError;
use chatsync_core::{ConnectionEvent, LoadTicket, Message, PendingSend, Room, RoomId, User};

/// Events processed by the App state machine.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Room list request completed.
    RoomsLoaded(Result<Vec<Room>, FetchError>),

    /// User list request completed.
    UsersLoaded(Result<Vec<User>, FetchError>),

    /// Backlog request completed.
    HistoryLoaded {
        /// Ticket from the [`crate::AppAction::FetchHistory`] that started it.
        ticket: LoadTicket,
        /// Room that was loaded.
        room_id: RoomId,
        /// Messages, oldest first.
        result: Result<Vec<Message>, FetchError>,
    },

    /// Push connection event.
    Connection(ConnectionEvent),

    /// Message submission completed.
    SendCompleted {
        /// The optimistic entry the submission belongs to.
        pending: PendingSend,
        /// Canonical saved message.
        result: Result<Message, FetchError>,
    },
}
