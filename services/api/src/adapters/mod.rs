pub mod correction_llm;
pub mod db;
pub mod detect_llm;
pub mod local_store;
pub mod tutor_llm;

pub use correction_llm::OpenAiCorrectionAdapter;
pub use db::{DbAdapter, RemoteStorage};
pub use detect_llm::OpenAiDetectAdapter;
pub use local_store::{LocalStore, LocalStores};
pub use tutor_llm::OpenAiTutorAdapter;
