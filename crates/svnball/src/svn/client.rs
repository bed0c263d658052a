use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::InfoError;
use crate::process::{RunError, ToolCommand};
use crate::svn::{DirectoryListing, InfoSource, xml};

/// [`InfoSource`] backed by the `svn` command line client.
#[derive(Debug, Clone)]
pub struct SvnClient {
    binary: PathBuf,
    timeout: Duration,
}

impl SvnClient {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn command(&self, subcommand: &str, url: &str) -> ToolCommand {
        ToolCommand::new(&self.binary)
            .arg(subcommand)
            .arg("--xml")
            .arg("--non-interactive")
            .arg("--")
            .arg(url)
    }

    async fn query(&self, subcommand: &str, url: &str) -> Result<String, InfoError> {
        let cmd = self.command(subcommand, url);
        let output = cmd.run(self.timeout).await.map_err(|e| match e {
            RunError::Spawn(source) => InfoError::Spawn {
                program: cmd.program().display().to_string(),
                source,
            },
            RunError::TimedOut => InfoError::Timeout {
                command: cmd.display(),
                timeout: self.timeout,
            },
        })?;

        if !output.success() {
            warn!(
                command = %cmd.display(),
                status = %output.exit_status(),
                "svn query failed"
            );
            return Err(InfoError::ExternalTool {
                command: cmd.display(),
                status: output.exit_status(),
                output: output.combined(),
            });
        }

        Ok(output.stdout)
    }
}

impl Default for SvnClient {
    fn default() -> Self {
        Self::new("svn", Duration::from_secs(300))
    }
}

#[async_trait]
impl InfoSource for SvnClient {
    async fn latest_revision(&self, url: &str) -> Result<u64, InfoError> {
        let stdout = self.query("info", url).await?;
        let revision = xml::parse_info_revision(&stdout)?;
        debug!(url = %url, revision, "Fetched latest revision");
        Ok(revision)
    }

    async fn child_directories(&self, url: &str) -> Result<DirectoryListing, InfoError> {
        let stdout = self.query("ls", url).await?;
        let listing = xml::parse_listing(&stdout)?;
        debug!(url = %url, entries = listing.entries.len(), "Fetched directory listing");
        Ok(listing)
    }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use crate::svn::EntryKind;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Stand-in `svn` answering `info`, `ls` and `export`. URLs containing
    /// `missing` fail the way a real server does for unknown paths; exports
    /// of URLs containing `slow` take a second between two files.
    const FAKE_SVN: &str = r##"#!/bin/sh
cmd="$1"
while [ $# -gt 0 ] && [ "$1" != "--" ]; do shift; done
shift
url="$1"
case "$url" in
  *missing*) echo "svn: E170000: URL '$url' doesn't exist" >&2; exit 1 ;;
esac
case "$cmd" in
  info)
    cat <<EOF
<?xml version="1.0" encoding="UTF-8"?>
<info><entry kind="dir" path="trunk" revision="1301"><url>$url</url>
<commit revision="1298"><author>sminnee</author><date>2008-03-04T05:06:07.123456Z</date></commit>
</entry></info>
EOF
    ;;
  ls)
    cat <<EOF
<?xml version="1.0" encoding="UTF-8"?>
<lists><list path="$url">
<entry kind="dir"><name>trunk</name><commit revision="12"><author>a</author><date>2008-01-15T12:30:00.000000Z</date></commit></entry>
<entry kind="file"><name>README</name><size>3</size><commit revision="3"><author>a</author><date>2007-11-01T10:00:00.000000Z</date></commit></entry>
</list></lists>
EOF
    ;;
  export)
    mkdir "$2" || exit 1
    echo "exported from $url" > "$2/README"
    case "$url" in
      *slow*) echo $$ > "$2/FIRST"; sleep 1; echo $$ > "$2/SECOND" ;;
    esac
    ;;
  *) echo "unsupported subcommand $cmd" >&2; exit 2 ;;
esac
"##;

    pub(crate) fn write_fake_svn(dir: &Path) -> PathBuf {
        let path = dir.join("svn");
        std::fs::write(&path, FAKE_SVN).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_latest_revision_from_info() {
        let dir = tempfile::tempdir().unwrap();
        let client = SvnClient::new(write_fake_svn(dir.path()), Duration::from_secs(10));

        let revision = client
            .latest_revision("http://svn.example.com/modules/blog/trunk")
            .await
            .unwrap();
        assert_eq!(revision, 1298);
    }

    #[tokio::test]
    async fn test_child_directories_from_ls() {
        let dir = tempfile::tempdir().unwrap();
        let client = SvnClient::new(write_fake_svn(dir.path()), Duration::from_secs(10));

        let listing = client
            .child_directories("http://svn.example.com/modules/blog")
            .await
            .unwrap();
        assert_eq!(listing.entries.len(), 2);
        assert_eq!(listing.entries["trunk"].kind, EntryKind::Dir);
        assert_eq!(listing.entries["trunk"].revision, 12);
        assert!(!listing.is_branch_container());
    }

    #[tokio::test]
    async fn test_server_error_keeps_output() {
        let dir = tempfile::tempdir().unwrap();
        let client = SvnClient::new(write_fake_svn(dir.path()), Duration::from_secs(10));

        match client.latest_revision("http://svn.example.com/missing").await {
            Err(InfoError::ExternalTool { status, output, .. }) => {
                assert_eq!(status.0, Some(1));
                assert!(output.contains("E170000"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let client = SvnClient::new("/nonexistent/svn", Duration::from_secs(10));
        assert!(matches!(
            client.latest_revision("http://svn.example.com/x").await,
            Err(InfoError::Spawn { .. })
        ));
    }
}
