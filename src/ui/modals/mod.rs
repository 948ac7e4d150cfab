mod class_modal;
mod document_modal;
mod item_modal;

pub use class_modal::ClassModal;
pub use document_modal::DocumentModal;
pub use item_modal::ItemModal;
