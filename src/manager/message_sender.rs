use std::fmt::Debug;

use flume::{Sender, TrySendError};
use tracing::{error, trace, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum SingleOrMany<T> {
    Single(T),
    Many(Vec<T>),
}

impl<T> From<T> for SingleOrMany<T> {
    fn from(msg: T) -> Self {
        SingleOrMany::Single(msg)
    }
}

impl<T> From<Vec<T>> for SingleOrMany<T> {
    fn from(msgs: Vec<T>) -> Self {
        SingleOrMany::Many(msgs)
    }
}

/// Sends reconcile messages to the frontend listener
#[derive(Debug)]
pub struct MessageSender<T> {
    sender: Sender<SingleOrMany<T>>,
}

impl<T> Clone for MessageSender<T> {
    fn clone(&self) -> Self {
        Self { sender: self.sender.clone() }
    }
}

impl<T> MessageSender<T>
where
    T: Debug + Send + Sync + 'static,
{
    pub fn new(sender: Sender<SingleOrMany<T>>) -> Self {
        Self { sender }
    }

    pub fn send(&self, message: impl Into<SingleOrMany<T>>) {
        let message = message.into();
        trace!("send: {message:?}");

        match self.sender.try_send(message) {
            Ok(_) => {}
            Err(TrySendError::Full(message)) => {
                warn!("unable to send, queue is full, sending async");

                let me = self.clone();
                uos_tokio::task::spawn(async move { me.send_async(message).await });
            }
            Err(e) => {
                error!("unable to send message to the frontend: {e:?}");
            }
        }
    }

    pub async fn send_async(&self, message: impl Into<SingleOrMany<T>>) {
        let message = message.into();
        trace!("send_async: {message:?}");

        if let Err(err) = self.sender.send_async(message).await {
            error!("unable to send message to the frontend: {err}");
        }
    }
}
