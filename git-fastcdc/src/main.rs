mod application;
mod presentation;

use fastcdc_core::Result;

fn main() -> Result<()> {
    application::run()
}
