pub mod messenger;
pub mod router;

pub use messenger::{LoggingMessenger, Messenger, MessengerError, MessengerErrorKind, NotificationPayload};
pub use router::NotificationRouter;
