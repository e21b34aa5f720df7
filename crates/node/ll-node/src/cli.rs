pub(crate) mod apply_blocks;

use crate::Error;

pub(crate) trait CliCommand {
    /// Run the command
    fn run(self) -> Result<(), Error>;
}
