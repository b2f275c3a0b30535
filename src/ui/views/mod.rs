mod confirm_delete;
mod permission_list;
mod profile;
mod role_detail;
mod role_form;
mod role_list;
mod sign_in;

pub use confirm_delete::ConfirmDeleteView;
pub use permission_list::PermissionListView;
pub use profile::ProfileView;
pub use role_detail::RoleDetailView;
pub use role_form::RoleFormView;
pub use role_list::RoleListView;
pub use sign_in::SignInView;

use std::future::Future;
use tokio::sync::oneshot::{self, error::TryRecvError};

/// Run `task` in the background; the answer arrives on the returned
/// receiver. Dropping the receiver (with its view) discards the answer.
fn spawn_reply<T, Fut>(task: Fut) -> oneshot::Receiver<T>
where
  T: Send + 'static,
  Fut: Future<Output = T> + Send + 'static,
{
  let (tx, rx) = oneshot::channel();
  tokio::spawn(async move {
    let _ = tx.send(task.await);
  });
  rx
}

/// Take the answer out of `slot` once it has arrived.
fn poll_reply<T>(slot: &mut Option<oneshot::Receiver<T>>) -> Option<T> {
  let rx = slot.as_mut()?;
  match rx.try_recv() {
    Ok(value) => {
      *slot = None;
      Some(value)
    }
    Err(TryRecvError::Empty) => None,
    Err(TryRecvError::Closed) => {
      *slot = None;
      None
    }
  }
}
