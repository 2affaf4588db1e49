use crate::models::AlertNotification;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Nombre max de notifications conservées
pub const FEED_CAPACITY: usize = 10;

/// Feed borné des alertes récentes, plus récentes d'abord.
/// Écrivain unique (le moteur de réconciliation), lecteurs multiples.
pub struct AlertFeed {
    entries: Mutex<VecDeque<AlertNotification>>,
}

impl AlertFeed {
    pub fn new() -> Self {
        Self { entries: Mutex::new(VecDeque::with_capacity(FEED_CAPACITY)) }
    }

    /// Insère en tête ; au-delà de la capacité, la plus ancienne sort.
    pub fn push(&self, notification: AlertNotification) {
        let mut entries = self.entries.lock();
        entries.push_front(notification);
        while entries.len() > FEED_CAPACITY {
            entries.pop_back();
        }
    }

    pub fn recent(&self) -> Vec<AlertNotification> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for AlertFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(n: usize) -> AlertNotification {
        AlertNotification {
            id: format!("id-{}", n),
            device_id: format!("device{:03}", n % 3),
            kind: "SPEECH".into(),
            message: format!("alert {}", n),
            rms: n as i64,
            zcr: 0.1,
            observed_at: n as i64 * 1_000,
            confidence: "High".into(),
        }
    }

    #[test]
    fn test_newest_first() {
        let feed = AlertFeed::new();
        feed.push(notification(1));
        feed.push(notification(2));
        let recent = feed.recent();
        assert_eq!(recent[0].id, "id-2");
        assert_eq!(recent[1].id, "id-1");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let feed = AlertFeed::new();
        for n in 0..11 {
            feed.push(notification(n));
        }
        let recent = feed.recent();
        assert_eq!(recent.len(), FEED_CAPACITY);
        assert_eq!(recent[0].id, "id-10");
        // la toute première notification a été évincée
        assert!(!recent.iter().any(|a| a.id == "id-0"));
        assert_eq!(recent.last().unwrap().id, "id-1");
    }

    #[test]
    fn test_clear() {
        let feed = AlertFeed::new();
        feed.push(notification(1));
        feed.clear();
        assert!(feed.is_empty());
    }
}
