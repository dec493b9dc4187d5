//! Background delivery of outbound email.
//!
//! Request handlers submit messages to a bounded channel and return
//! immediately. A fixed pool of worker tasks drains the channel and hands each
//! message to the [`Mailer`]. Outcomes go to a [`DeliveryObserver`]; nothing is
//! reported back to the submitter.

use super::email_service::{DeliveryError, Mailer};
use std::sync::{Arc, Mutex};
use tokio::{
    sync::{mpsc, Mutex as AsyncMutex},
    task::JoinHandle,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

pub trait DeliveryObserver: Send + Sync {
    fn delivered(&self, _mail: &OutgoingMail) {}
    fn failed(&self, mail: &OutgoingMail, error: &DeliveryError);
}

pub struct TracingDeliveryObserver;

impl DeliveryObserver for TracingDeliveryObserver {
    fn delivered(&self, mail: &OutgoingMail) {
        tracing::debug!(to = %mail.to, subject = %mail.subject, "email delivered");
    }

    fn failed(&self, mail: &OutgoingMail, error: &DeliveryError) {
        tracing::error!(to = %mail.to, subject = %mail.subject, error = %error, "failed to deliver email");
    }
}

/// Counts outcomes. Useful for tests and health reporting.
#[derive(Default)]
pub struct RecordingDeliveryObserver {
    delivered: Mutex<Vec<OutgoingMail>>,
    failed: Mutex<Vec<(OutgoingMail, String)>>,
}

impl RecordingDeliveryObserver {
    pub fn delivered_mail(&self) -> Vec<OutgoingMail> {
        self.delivered
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn failures(&self) -> Vec<(OutgoingMail, String)> {
        self.failed.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl DeliveryObserver for RecordingDeliveryObserver {
    fn delivered(&self, mail: &OutgoingMail) {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(mail.clone());
        }
    }

    fn failed(&self, mail: &OutgoingMail, error: &DeliveryError) {
        if let Ok(mut failed) = self.failed.lock() {
            failed.push((mail.clone(), error.to_string()));
        }
    }
}

#[derive(Clone)]
pub struct MailQueue {
    sender: mpsc::Sender<OutgoingMail>,
    observer: Arc<dyn DeliveryObserver>,
}

/// Handles of the worker tasks. Workers exit once every [`MailQueue`] clone
/// is dropped and the channel is drained.
pub struct MailWorkers {
    handles: Vec<JoinHandle<()>>,
}

impl MailWorkers {
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!("mail worker panicked: {}", e);
            }
        }
    }
}

impl MailQueue {
    /// Spawns `workers` tasks on the current tokio runtime.
    pub fn spawn(
        mailer: Arc<dyn Mailer>,
        observer: Arc<dyn DeliveryObserver>,
        capacity: usize,
        workers: usize,
    ) -> (Self, MailWorkers) {
        let (sender, receiver) = mpsc::channel::<OutgoingMail>(capacity.max(1));
        let receiver = Arc::new(AsyncMutex::new(receiver));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let receiver = receiver.clone();
                let mailer = mailer.clone();
                let observer = observer.clone();
                tokio::spawn(async move {
                    loop {
                        let next = { receiver.lock().await.recv().await };
                        let Some(mail) = next else {
                            tracing::debug!("mail worker {} stopping", worker);
                            break;
                        };
                        match mailer.send(&mail.to, &mail.subject, &mail.body).await {
                            Ok(()) => observer.delivered(&mail),
                            Err(e) => observer.failed(&mail, &e),
                        }
                    }
                })
            })
            .collect();

        (Self { sender, observer }, MailWorkers { handles })
    }

    /// Queues a message without waiting. Returns false (after notifying the
    /// observer) when the queue is full or shut down.
    pub fn submit(&self, mail: OutgoingMail) -> bool {
        match self.sender.try_send(mail) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(mail))
            | Err(mpsc::error::TrySendError::Closed(mail)) => {
                self.observer
                    .failed(&mail, &DeliveryError::QueueUnavailable);
                false
            }
        }
    }
}
