//! Local disk IO
//!
//! Opens physical files after checking the token that came with the
//! location. Parent directories are created on demand for writes.

use super::TokenSettings;
use crate::domain::{chunk_keys, Extensible, IODriver, IOHandler, OpenFlags, Whence};
use crate::error::{errc, Error, ErrorCategory, Result};
use crate::security::{validate_token, SecurityContext};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct LocalIODriver {
    settings: TokenSettings,
    security: Option<Arc<SecurityContext>>,
}

impl LocalIODriver {
    pub fn new(settings: TokenSettings) -> Self {
        Self {
            settings,
            security: None,
        }
    }

    fn check_token(&self, pfn: &str, write: bool, extras: &Extensible) -> Result<()> {
        let token = extras.get_str(chunk_keys::TOKEN, "")?;
        if token.is_empty() {
            return Err(Error::permission_denied(format!("no token presented for {}", pfn)));
        }
        let id = self.settings.token_id(self.security.as_deref())?;
        let status = validate_token(token, &id, pfn, &self.settings.password, write);
        if !status.is_valid() {
            warn!(pfn, id = %id, %status, "token rejected");
            return Err(Error::permission_denied(format!(
                "token for {} is {}",
                pfn, status
            )));
        }
        Ok(())
    }
}

impl IODriver for LocalIODriver {
    fn impl_id(&self) -> String {
        "LocalIODriver".into()
    }

    fn set_security_context(&mut self, ctx: &Arc<SecurityContext>) -> Result<()> {
        self.security = Some(Arc::clone(ctx));
        Ok(())
    }

    fn create_io_handler(
        &mut self,
        pfn: &str,
        flags: OpenFlags,
        extras: &Extensible,
    ) -> Result<Box<dyn IOHandler>> {
        self.check_token(pfn, flags.write, extras)?;

        let opened = if flags.write {
            if let Some(parent) = Path::new(pfn).parent() {
                std::fs::create_dir_all(parent)?;
            }
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(flags.create)
                .truncate(flags.truncate)
                .open(pfn)
        } else {
            File::open(pfn)
        };
        let file = opened.map_err(|e| Error::from(e).with_context(pfn))?;

        debug!(pfn, write = flags.write, "local file opened");
        Ok(Box::new(LocalIOHandler::new(file)))
    }
}

pub struct LocalIOHandler {
    file: Option<File>,
    eof: bool,
}

impl LocalIOHandler {
    pub fn new(file: File) -> Self {
        Self {
            file: Some(file),
            eof: false,
        }
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| Error::new(ErrorCategory::System, errc::EBADF, "handler is closed"))
    }
}

impl IOHandler for LocalIOHandler {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let read = self.file()?.read(buf)?;
        if read == 0 && !buf.is_empty() {
            self.eof = true;
        }
        Ok(read)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.file()?.write(buf)?)
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let target = match whence {
            Whence::Start => SeekFrom::Start(
                u64::try_from(offset)
                    .map_err(|_| Error::invalid_argument("negative absolute offset"))?,
            ),
            Whence::Current => SeekFrom::Current(offset),
            Whence::End => SeekFrom::End(offset),
        };
        let position = self.file()?.seek(target)?;
        self.eof = false;
        Ok(position)
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.file()?.stream_position()?)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.file()?.flush()?)
    }

    fn eof(&self) -> bool {
        self.eof
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all()?;
        }
        Ok(())
    }
}
