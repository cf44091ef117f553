//! Application side-effects and intents.
//!
//! [`AppAction`]s are produced by the [`crate::App`] state machine and carried
//! out by the runtime. Every fetch action carries what the matching
//! [`crate::AppEvent`] must echo back.

use chatsync_client::FetchError;
use chatsync_core::{LoadTicket, Outbound, PendingSend, RoomId};

/// Actions produced by the App state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    /// Publish a fresh view.
    Render,

    /// Stop the runtime.
    Quit,

    /// Open the push connection.
    Connect,

    /// Close the push connection. No reconnect follows.
    Disconnect,

    /// Load the room list.
    FetchRooms,

    /// Load the user list.
    FetchUsers,

    /// Load a room's backlog.
    FetchHistory {
        /// Ticket the response must carry.
        ticket: LoadTicket,
        /// Room to load.
        room_id: RoomId,
    },

    /// Submit an optimistic message to the backend.
    SubmitMessage(PendingSend),

    /// Write a frame to the push connection.
    SendFrame(Outbound),

    /// A send failed; the host may restore the draft.
    SendFailed {
        /// Room the message was for.
        room_id: RoomId,
        /// Content of the failed message.
        draft: String,
        /// Why the backend refused it.
        error: FetchError,
    },
}
