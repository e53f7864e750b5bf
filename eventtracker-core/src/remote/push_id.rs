//! Chronologically ordered document keys.
//!
//! A push id is 20 characters: 8 encode the creation time in milliseconds and 12
//! are random. Ids made within the same millisecond reuse the previous random part
//! incremented by one, so ids from one generator always sort in creation order.

use chrono::Utc;
use rand::Rng;

/// Ascending in ASCII, so string order matches numeric order.
const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

#[derive(Debug, Clone)]
pub struct PushIdGenerator {
    last_millis: Option<i64>,
    last_random: [u8; RANDOM_CHARS],
}

impl Default for PushIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PushIdGenerator {
    pub fn new() -> Self {
        PushIdGenerator {
            last_millis: None,
            last_random: [0; RANDOM_CHARS],
        }
    }

    /// Generate an id stamped with the current time.
    pub fn generate(&mut self) -> String {
        self.generate_at(Utc::now().timestamp_millis())
    }

    /// Generate an id stamped with `now_millis`. A clock that steps backwards is
    /// treated as if it stood still.
    pub fn generate_at(&mut self, now_millis: i64) -> String {
        let millis = match self.last_millis {
            Some(last) => now_millis.max(last),
            None => now_millis,
        };

        if self.last_millis == Some(millis) {
            self.increment_random();
        } else {
            let mut rng = rand::thread_rng();
            for slot in self.last_random.iter_mut() {
                *slot = rng.gen_range(0..64);
            }
        }
        self.last_millis = Some(millis);

        let mut time_part = [0u8; TIME_CHARS];
        let mut remaining = millis.max(0);
        for slot in time_part.iter_mut().rev() {
            *slot = PUSH_CHARS[(remaining % 64) as usize];
            remaining /= 64;
        }

        let mut id = String::with_capacity(TIME_CHARS + RANDOM_CHARS);
        id.extend(time_part.iter().map(|&b| b as char));
        id.extend(
            self.last_random
                .iter()
                .map(|&index| PUSH_CHARS[index as usize] as char),
        );
        id
    }

    fn increment_random(&mut self) {
        for slot in self.last_random.iter_mut().rev() {
            if *slot == 63 {
                *slot = 0;
            } else {
                *slot += 1;
                return;
            }
        }
    }
}
