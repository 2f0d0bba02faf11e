//! The emitter interface.

use std::io;

use opal_mcode as mcode;

/// Renders a machine module to an output stream.
pub trait Emitter {
    fn generate(&mut self, module: &mcode::Module, out: &mut dyn io::Write) -> io::Result<()>;
}
