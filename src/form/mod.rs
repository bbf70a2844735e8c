pub mod submission;
pub mod export;

pub use submission::{validate_cpf, DateRequest, QuestionsRequest, SessionRequest, SlotRequest};
pub use export::{build_participation, write_participation_csv, ParticipationRow};
