//! The async file RPC façade (§4.7): `listFiles`, `download`, `stat`, `delete`, `ln`, `mv`,
//! `mkdir`, `create`, plus reserved stubs kept for API parity with the remote framer's surface.
//!
//! Every operation serializes through the conductor's single command queue (there is no
//! parallelism between two file RPCs on one conductor) and suspends on a [`tokio::sync::oneshot`]
//! channel until the matching `command-end` boundary finalizes its [`Handler`](crate::handler::Handler::File).

use serde::Deserialize;

use crate::error::{Error, Result};

/// One entry of a `listFiles` response, decoded from the framer's JSON array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteFile {
    pub name: String,
    pub size: u64,
    pub is_directory: bool,
    pub modified: i64,
    pub permissions: u32,
}

/// A single-path `stat` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteStat {
    pub size: u64,
    pub is_directory: bool,
    pub modified: i64,
    pub permissions: u32,
}

/// Interprets a `(payload, status)` pair returned by a `framerFile` round-trip per §4.7 step 4:
/// status < 0 means the connection was lost before a response arrived, status > 0 means the
/// target path was not found (the framer does not distinguish a permission error from a missing
/// path — see the open question this resolves in `DESIGN.md`), and status == 0 means `payload`
/// holds the operation's result, still to be decoded by the caller.
fn interpret_status(payload: Vec<u8>, status: i32) -> Result<Vec<u8>> {
    if status < 0 {
        Err(Error::ConnectionClosed)
    } else if status > 0 {
        Err(Error::FileNotFound)
    } else {
        Ok(payload)
    }
}

fn decode_json<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload).map_err(|e| Error::InternalError(e.to_string()))
}

fn path_bytes(path: &str) -> Vec<u8> {
    path.as_bytes().to_vec()
}

/// The subset of conductor behavior the façade needs: enqueue a `framerFile` subcommand and await
/// its `(payload, status)` result. Implemented by [`crate::conductor::Conductor`].
pub trait FileRpcDispatch {
    fn dispatch_file(
        &mut self,
        sub: crate::command::FileSubcommand,
    ) -> tokio::sync::oneshot::Receiver<(Vec<u8>, i32)>;
}

/// Lists the contents of a remote directory.
pub async fn list_files(
    conductor: &mut impl FileRpcDispatch,
    path: &str,
    sort: crate::command::ListSort,
) -> Result<Vec<RemoteFile>> {
    let sub = crate::command::FileSubcommand::Ls {
        path: path_bytes(path),
        sort,
    };
    let (payload, status) = await_result(conductor, sub).await?;
    let payload = interpret_status(payload, status)?;
    decode_json(&payload)
}

/// Downloads the full contents of a remote file.
pub async fn download(conductor: &mut impl FileRpcDispatch, path: &str) -> Result<Vec<u8>> {
    let sub = crate::command::FileSubcommand::Fetch {
        path: path_bytes(path),
    };
    let (payload, status) = await_result(conductor, sub).await?;
    let payload = interpret_status(payload, status)?;
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD
        .decode(&payload)
        .map_err(|e| Error::InternalError(e.to_string()))
}

/// Stats a remote path without reading it.
pub async fn stat(conductor: &mut impl FileRpcDispatch, path: &str) -> Result<RemoteStat> {
    let sub = crate::command::FileSubcommand::Stat {
        path: path_bytes(path),
    };
    let (payload, status) = await_result(conductor, sub).await?;
    let payload = interpret_status(payload, status)?;
    decode_json(&payload)
}

/// Removes a remote path, optionally recursively.
pub async fn delete(conductor: &mut impl FileRpcDispatch, path: &str, recursive: bool) -> Result<()> {
    let sub = crate::command::FileSubcommand::Rm {
        path: path_bytes(path),
        recursive,
    };
    let (payload, status) = await_result(conductor, sub).await?;
    interpret_status(payload, status)?;
    Ok(())
}

/// Creates a symlink at `symlink` pointing at `source`.
pub async fn ln(conductor: &mut impl FileRpcDispatch, source: &str, symlink: &str) -> Result<()> {
    let sub = crate::command::FileSubcommand::Ln {
        source: path_bytes(source),
        symlink: path_bytes(symlink),
    };
    let (payload, status) = await_result(conductor, sub).await?;
    interpret_status(payload, status)?;
    Ok(())
}

/// Renames/moves `source` to `dest`.
pub async fn mv(conductor: &mut impl FileRpcDispatch, source: &str, dest: &str) -> Result<()> {
    let sub = crate::command::FileSubcommand::Mv {
        source: path_bytes(source),
        dest: path_bytes(dest),
    };
    let (payload, status) = await_result(conductor, sub).await?;
    interpret_status(payload, status)?;
    Ok(())
}

/// Creates a remote directory.
pub async fn mkdir(conductor: &mut impl FileRpcDispatch, path: &str) -> Result<()> {
    let sub = crate::command::FileSubcommand::Mkdir {
        path: path_bytes(path),
    };
    let (payload, status) = await_result(conductor, sub).await?;
    interpret_status(payload, status)?;
    Ok(())
}

/// Creates a remote file with the given content.
pub async fn create(conductor: &mut impl FileRpcDispatch, path: &str, content: &[u8]) -> Result<()> {
    let sub = crate::command::FileSubcommand::Create {
        path: path_bytes(path),
        content: content.to_vec(),
    };
    let (payload, status) = await_result(conductor, sub).await?;
    interpret_status(payload, status)?;
    Ok(())
}

/// Reserved for API parity with the framer's surface; has no framer counterpart yet.
pub async fn replace(_conductor: &mut impl FileRpcDispatch, _path: &str, _content: &[u8]) -> Result<()> {
    Err(Error::NotImplemented("replace"))
}

/// Reserved for API parity with the framer's surface; has no framer counterpart yet.
pub async fn set_modification_date(
    _conductor: &mut impl FileRpcDispatch,
    _path: &str,
    _when: i64,
) -> Result<()> {
    Err(Error::NotImplemented("setModificationDate"))
}

/// Reserved for API parity with the framer's surface; has no framer counterpart yet.
pub async fn chmod(_conductor: &mut impl FileRpcDispatch, _path: &str, _mode: u32) -> Result<()> {
    Err(Error::NotImplemented("chmod"))
}

async fn await_result(
    conductor: &mut impl FileRpcDispatch,
    sub: crate::command::FileSubcommand,
) -> Result<(Vec<u8>, i32)> {
    let rx = conductor.dispatch_file(sub);
    rx.await.map_err(|_| Error::ConnectionClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FileSubcommand;
    use tokio::sync::oneshot;

    struct FakeDispatch {
        reply: Option<(Vec<u8>, i32)>,
        drop_instead: bool,
        last_sub: Option<FileSubcommand>,
    }

    impl FileRpcDispatch for FakeDispatch {
        fn dispatch_file(&mut self, sub: FileSubcommand) -> oneshot::Receiver<(Vec<u8>, i32)> {
            self.last_sub = Some(sub);
            let (tx, rx) = oneshot::channel();
            if !self.drop_instead {
                let _ = tx.send(self.reply.clone().unwrap());
            }
            rx
        }
    }

    #[tokio::test]
    async fn list_files_decodes_json_array() {
        let json = br#"[{"name":"a","size":1,"is_directory":false,"modified":0,"permissions":420}]"#;
        let mut d = FakeDispatch {
            reply: Some((json.to_vec(), 0)),
            drop_instead: false,
            last_sub: None,
        };
        let files = list_files(&mut d, "/tmp", crate::command::ListSort::ByName)
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "a");
    }

    #[tokio::test]
    async fn positive_status_is_file_not_found() {
        let mut d = FakeDispatch {
            reply: Some((Vec::new(), 2)),
            drop_instead: false,
            last_sub: None,
        };
        let err = stat(&mut d, "/missing").await.unwrap_err();
        assert!(matches!(err, Error::FileNotFound));
    }

    #[tokio::test]
    async fn negative_status_is_connection_closed() {
        let mut d = FakeDispatch {
            reply: Some((Vec::new(), -1)),
            drop_instead: false,
            last_sub: None,
        };
        let err = mkdir(&mut d, "/x").await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn dropped_sender_is_connection_closed() {
        let mut d = FakeDispatch {
            reply: None,
            drop_instead: true,
            last_sub: None,
        };
        let err = delete(&mut d, "/x", false).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn reserved_stubs_are_not_implemented() {
        let mut d = FakeDispatch {
            reply: Some((Vec::new(), 0)),
            drop_instead: false,
            last_sub: None,
        };
        assert!(matches!(
            replace(&mut d, "/x", b"y").await.unwrap_err(),
            Error::NotImplemented("replace")
        ));
        assert!(matches!(
            chmod(&mut d, "/x", 0o644).await.unwrap_err(),
            Error::NotImplemented("chmod")
        ));
    }
}
