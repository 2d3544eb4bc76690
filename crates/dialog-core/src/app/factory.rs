//! Dialog construction hook

use crate::app::Application;
use crate::connection::Connection;
use crate::dialog::Dialog;
use crate::errors::DialogResult;
use crate::routing::Router;

/// Everything a factory needs to build a dialog
#[derive(Debug, Clone)]
pub struct DialogParams {
    pub app: Application,
    pub from_uri: String,
    pub to_uri: String,
    pub call_id: String,
    pub connection: Connection,
    pub contact_uri: Option<String>,
    pub password: Option<String>,
    pub cseq: u32,
    pub router: Router,
}

/// Builds the dialogs of every connection of an application
///
/// Implement this to hand out dialogs that come pre-configured, for example
/// with callbacks already registered:
///
/// ```rust
/// use sipline_dialog_core::app::{DialogFactory, DialogParams};
/// use sipline_dialog_core::dialog::{Callback, Dialog};
/// use sipline_dialog_core::errors::DialogResult;
///
/// struct LoggingFactory;
///
/// impl DialogFactory for LoggingFactory {
///     fn create_dialog(&self, params: DialogParams) -> DialogResult<Dialog> {
///         let dialog = Dialog::new(params)?;
///         dialog.register_callback("NOTIFY", Callback::from_fn(|dialog, request| {
///             tracing::info!(call_id = %dialog.call_id(), "NOTIFY: {}", request.payload);
///             Ok(())
///         }));
///         Ok(dialog)
///     }
/// }
/// ```
pub trait DialogFactory: Send + Sync {
    fn create_dialog(&self, params: DialogParams) -> DialogResult<Dialog>;
}

/// Builds plain [`Dialog`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDialogFactory;

impl DialogFactory for DefaultDialogFactory {
    fn create_dialog(&self, params: DialogParams) -> DialogResult<Dialog> {
        Dialog::new(params)
    }
}
