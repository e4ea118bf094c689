//! Clients for the third-party services the API talks to.

pub mod google_drive;
pub mod twilio;

pub use google_drive::{DocumentStorage, DriveError, DriveFile, GoogleDriveClient};
pub use twilio::{MessageSender, MessagingError, SentMessage, TwilioClient};
