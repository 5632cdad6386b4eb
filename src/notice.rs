/// Precondition failures. They are shown to the user and abort the action
/// before any channel or network activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Notice {
    #[error("No active editor")]
    NoActiveEditor,
    #[error("No code to explain")]
    NothingToExplain,
    #[error("No code to fix")]
    NothingToFix,
    #[error("Editor is empty")]
    EditorEmpty,
    #[error("No error found in terminal. Run the code first.")]
    NoErrorInTerminal,
}
