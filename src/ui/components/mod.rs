mod command_input;
mod form;
mod input;
mod key_result;
mod modal;

pub use command_input::{CommandEvent, CommandInput};
pub use form::{Form, FormEvent, FormField};
pub use key_result::KeyResult;
pub use modal::ModalForm;
