use std::collections::VecDeque;

use crate::detect::DetectError;

/// Hysteresis gate: fires when at least `k` of the last `n` samples exceeded.
#[derive(Debug, Clone)]
pub struct SustainAlarm {
    history: VecDeque<bool>,
    lookback: usize,
    required: usize,
}

impl SustainAlarm {
    pub fn new(lookback: usize, required: usize) -> Result<Self, DetectError> {
        if required == 0 || required > lookback {
            return Err(DetectError::SustainUnreachable { required, lookback });
        }
        Ok(Self {
            history: VecDeque::with_capacity(lookback),
            lookback,
            required,
        })
    }

    /// Record one exceed flag and report whether the alarm is raised.
    pub fn update(&mut self, exceed: bool) -> bool {
        if self.history.len() == self.lookback {
            self.history.pop_front();
        }
        self.history.push_back(exceed);
        self.exceed_count() >= self.required
    }

    pub fn exceed_count(&self) -> usize {
        self.history.iter().filter(|&&e| e).count()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alarm_six_of_ten() {
        let mut alarm = SustainAlarm::new(10, 6).unwrap();
        let flags = [true, true, true, true, true, true, false, false, false, false];
        let states: Vec<bool> = flags.iter().map(|&f| alarm.update(f)).collect();
        assert_eq!(&states[..5], &[false; 5]);
        assert_eq!(&states[5..], &[true; 5]);
    }

    #[test]
    fn test_alarm_decays_as_flags_age_out() {
        let mut alarm = SustainAlarm::new(3, 2).unwrap();
        assert!(!alarm.update(true));
        assert!(alarm.update(true));
        assert!(alarm.update(false));
        // [true, false, false]
        assert!(!alarm.update(false));
        assert_eq!(alarm.len(), 3);
    }

    #[test]
    fn test_unreachable_configuration_rejected() {
        assert!(matches!(
            SustainAlarm::new(3, 4),
            Err(DetectError::SustainUnreachable { required: 4, lookback: 3 })
        ));
        assert!(SustainAlarm::new(3, 0).is_err());
    }
}
