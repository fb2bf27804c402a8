//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Track lifecycle status.
    TrackStatus {
        /// Created, no content yet.
        Pending = 1,
        /// Has prompt/lyrics, generation not yet requested.
        Draft = 2,
        /// Submitted to a provider, awaiting result.
        Processing = 3,
        /// Terminal: at least one playable version attached.
        Completed = 4,
        /// Terminal: generation failed or was cancelled.
        Failed = 5,
    }
}

define_status_enum! {
    /// Stem separation job status.
    StemStatus {
        Pending = 1,
        Processing = 2,
        Completed = 3,
        Failed = 4,
    }
}

define_status_enum! {
    /// Generation-job ledger status.
    GenerationJobStatus {
        /// Submitted (or being submitted), result outstanding.
        Active = 1,
        Completed = 2,
        Failed = 3,
        /// Replaced by a newer submission for the same track.
        Superseded = 4,
    }
}

impl TrackStatus {
    /// Whether this status ends the track's generation lifecycle.
    /// Versions may still be attached to a terminal track by later,
    /// independent jobs (extend, cover, upscale).
    pub fn is_terminal(self) -> bool {
        matches!(self, TrackStatus::Completed | TrackStatus::Failed)
    }

    /// The authoritative transition table. Every status write — from
    /// the orchestrator, a provider callback, or the recovery poller —
    /// must satisfy this check before touching the row.
    pub fn can_transition_to(self, next: TrackStatus) -> bool {
        use TrackStatus::*;
        matches!(
            (self, next),
            (Pending, Draft)
                | (Pending, Processing)
                | (Draft, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    /// Map a raw status ID back to the enum.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(TrackStatus::Pending),
            2 => Some(TrackStatus::Draft),
            3 => Some(TrackStatus::Processing),
            4 => Some(TrackStatus::Completed),
            5 => Some(TrackStatus::Failed),
            _ => None,
        }
    }

    /// Human-readable name matching the lookup table seed data.
    pub fn name(self) -> &'static str {
        match self {
            TrackStatus::Pending => "pending",
            TrackStatus::Draft => "draft",
            TrackStatus::Processing => "processing",
            TrackStatus::Completed => "completed",
            TrackStatus::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_status_ids_match_seed_data() {
        assert_eq!(TrackStatus::Pending.id(), 1);
        assert_eq!(TrackStatus::Draft.id(), 2);
        assert_eq!(TrackStatus::Processing.id(), 3);
        assert_eq!(TrackStatus::Completed.id(), 4);
        assert_eq!(TrackStatus::Failed.id(), 5);
    }

    #[test]
    fn generation_job_status_ids_match_seed_data() {
        assert_eq!(GenerationJobStatus::Active.id(), 1);
        assert_eq!(GenerationJobStatus::Completed.id(), 2);
        assert_eq!(GenerationJobStatus::Failed.id(), 3);
        assert_eq!(GenerationJobStatus::Superseded.id(), 4);
    }

    #[test]
    fn status_into_status_id() {
        let id: StatusId = TrackStatus::Processing.into();
        assert_eq!(id, 3);
    }

    #[test]
    fn legal_transitions() {
        use TrackStatus::*;
        assert!(Pending.can_transition_to(Draft));
        assert!(Pending.can_transition_to(Processing));
        assert!(Draft.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
    }

    #[test]
    fn no_transition_out_of_terminal_states() {
        use TrackStatus::*;
        for next in [Pending, Draft, Processing, Completed, Failed] {
            assert!(!Completed.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
    }

    #[test]
    fn no_backwards_or_skipping_transitions() {
        use TrackStatus::*;
        assert!(!Draft.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Draft.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Draft));
    }

    #[test]
    fn terminal_flags() {
        assert!(TrackStatus::Completed.is_terminal());
        assert!(TrackStatus::Failed.is_terminal());
        assert!(!TrackStatus::Processing.is_terminal());
        assert!(!TrackStatus::Pending.is_terminal());
        assert!(!TrackStatus::Draft.is_terminal());
    }

    #[test]
    fn from_id_round_trips() {
        for status in [
            TrackStatus::Pending,
            TrackStatus::Draft,
            TrackStatus::Processing,
            TrackStatus::Completed,
            TrackStatus::Failed,
        ] {
            assert_eq!(TrackStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(TrackStatus::from_id(99), None);
    }
}
