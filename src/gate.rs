use std::{
    cmp::Ordering,
    io::{BufRead, IsTerminal, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{
    outside::{
        program_runs, run_attached, run_capture_stdout, Ffmpeg, Ffprobe, StreamDownloader, Ytdl,
    },
    result::{Error, Result},
    settings::{home_dir, InstallPolicy, Settings},
};

const YT_DLP_RELEASE_URL: &str = "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp";

/// Package managers tried in order, with their install arguments
const PACKAGE_MANAGERS: [(&str, &[&str], bool); 5] = [
    ("apt-get", &["install", "-y"], true),
    ("dnf", &["install", "-y"], true),
    ("pacman", &["-S", "--noconfirm"], true),
    ("zypper", &["install", "-y"], true),
    ("brew", &["install"], false),
];

/// Interface name prefixes of VPN and overlay tunnels
const TUNNEL_PREFIXES: [&str; 11] = [
    "tun", "tap", "wg", "ppp", "utun", "ipsec", "nordlynx", "proton", "mullvad", "tailscale", "zt",
];

/// How a version relates to another one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrdering {
    Same,
    Newer,
    Older,
    /// At least one side is not a dotted numeric version
    Incomparable,
}

/// Compare dotted numeric versions such as `2024.08.06`.
/// Missing trailing components count as zero.
pub fn compare_versions(version: &str, other: &str) -> VersionOrdering {
    fn parts(v: &str) -> Option<Vec<u64>> {
        let v = v.trim().trim_start_matches('v');
        if v.is_empty() {
            return None;
        }
        v.split('.').map(|p| p.parse().ok()).collect()
    }

    let (Some(mut a), Some(mut b)) = (parts(version), parts(other)) else {
        return VersionOrdering::Incomparable;
    };
    let len = a.len().max(b.len());
    a.resize(len, 0);
    b.resize(len, 0);

    match a.cmp(&b) {
        Ordering::Equal => VersionOrdering::Same,
        Ordering::Greater => VersionOrdering::Newer,
        Ordering::Less => VersionOrdering::Older,
    }
}

/// The external programs a run needs, once verified
#[derive(Debug)]
pub struct Tools {
    pub fetcher: Option<Ytdl>,
    pub encoder: Ffmpeg,
    pub prober: Ffprobe,
}

/// Checks the external programs are there, offers to install the missing ones,
/// and warns about network conditions that make fetching flaky.
pub struct DependencyGate<'a> {
    settings: &'a Settings,
}

impl<'a> DependencyGate<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Verify (and maybe install) the encoder, the prober and, if `need_fetcher`,
    /// the fetcher.
    pub fn check(&self, need_fetcher: bool) -> Result<Tools> {
        let encoder = self.ensure(
            || Ffmpeg::new(self.settings.encoder.as_deref()),
            "ffmpeg",
            Installer::Package("ffmpeg"),
        )?;
        let prober = self.ensure(
            || Ffprobe::new(self.settings.prober.as_deref()),
            "ffprobe",
            Installer::Package("ffmpeg"),
        )?;

        let fetcher = if need_fetcher {
            let installed = local_bin().join("yt-dlp");
            let fetcher = self.ensure(
                || {
                    Ytdl::new(self.settings.fetcher.as_deref(), self.settings.socket_timeout).or_else(|err| {
                        // A fresh install may not be on the PATH yet
                        match installed.to_str() {
                            Some(path) if self.settings.fetcher.is_none() && installed.is_file() => {
                                Ytdl::new(Some(path), self.settings.socket_timeout)
                            }
                            _ => Err(err),
                        }
                    })
                },
                &Ytdl::wanted(self.settings.fetcher.as_deref()),
                Installer::Release {
                    url: YT_DLP_RELEASE_URL,
                    dest: installed.clone(),
                },
            )?;

            if self.settings.self_update {
                self_update(&fetcher);
            }
            Some(fetcher)
        } else {
            None
        };

        let tunnels = VpnDetector::default().detect();
        if !tunnels.is_empty() {
            warn!(
                "VPN-like network interfaces detected ({}): network timeouts are more likely",
                tunnels.join(", ")
            );
        }

        Ok(Tools {
            fetcher,
            encoder,
            prober,
        })
    }

    fn ensure<T>(&self, probe: impl Fn() -> Result<T>, what: &str, installer: Installer) -> Result<T> {
        match probe() {
            Ok(tool) => return Ok(tool),
            Err(Error::MissingDependency(_)) => {}
            Err(err) => return Err(err),
        }

        warn!("{what} not found");
        if !self.may_install(what, &installer) {
            return Err(Error::MissingDependency(format!("{what} (installation declined)")));
        }

        installer
            .install()
            .map_err(|err| Error::MissingDependency(format!("{what} (installation failed: {err})")))?;
        info!("{what} installed");

        probe()
    }

    fn may_install(&self, what: &str, installer: &Installer) -> bool {
        match self.settings.install {
            InstallPolicy::Always => true,
            InstallPolicy::Never => false,
            InstallPolicy::Ask if std::io::stdin().is_terminal() => {
                let question = format!("{what} is required. Install it {installer}? [y/N] ");
                ask_yes_no(&question, &mut std::io::stdin().lock(), &mut std::io::stderr())
            }
            InstallPolicy::Ask => {
                debug!("Not asking to install {what}: stdin is not a terminal");
                false
            }
        }
    }
}

/// Best-effort self-update of the fetcher: failures are logged and ignored.
pub fn self_update(fetcher: &dyn StreamDownloader) -> VersionOrdering {
    let before = fetcher.version().ok();

    if let Err(err) = fetcher.self_update() {
        debug!("{} self-update failed, continuing with the installed version: {err}", fetcher.name());
        return VersionOrdering::Same;
    }

    let after = fetcher.version().ok();
    let ordering = match (&after, &before) {
        (Some(after), Some(before)) => compare_versions(after, before),
        _ => VersionOrdering::Incomparable,
    };

    match ordering {
        VersionOrdering::Newer => info!(
            "{} updated from {} to {}",
            fetcher.name(),
            before.as_deref().unwrap_or("?"),
            after.as_deref().unwrap_or("?")
        ),
        VersionOrdering::Same => debug!("{} is up to date", fetcher.name()),
        VersionOrdering::Older => warn!("{} was downgraded by its self-update", fetcher.name()),
        VersionOrdering::Incomparable => debug!("Could not tell whether {} changed", fetcher.name()),
    }
    ordering
}

fn ask_yes_no(question: &str, input: &mut impl BufRead, output: &mut impl Write) -> bool {
    if write!(output, "{question}").and_then(|()| output.flush()).is_err() {
        return false;
    }
    let mut answer = String::new();
    if input.read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn local_bin() -> PathBuf {
    home_dir().join(".local").join("bin")
}

/// Ways to bring a missing program in
#[derive(Debug, Clone)]
enum Installer {
    /// Download the latest release binary
    Release { url: &'static str, dest: PathBuf },
    /// Install a package with the system package manager
    Package(&'static str),
}

impl std::fmt::Display for Installer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Installer::Release { dest, .. } => write!(f, "by downloading its latest release to {}", dest.display()),
            Installer::Package(package) => write!(f, "with the system package manager (package '{package}')"),
        }
    }
}

impl Installer {
    fn install(&self) -> Result<()> {
        match self {
            Installer::Release { url, dest } => {
                if let Some(dir) = dest.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                info!("Downloading {url}");
                run_attached("curl", |cmd| cmd.args(["-fL", "--progress-bar", "-o"]).arg(dest).arg(url))?;
                make_executable(dest)
            }
            Installer::Package(package) => {
                let (manager, args, needs_root) = PACKAGE_MANAGERS
                    .iter()
                    .find(|(manager, _, _)| program_runs(manager, "--version"))
                    .ok_or_else(|| Error::MissingDependency("a supported package manager".to_owned()))?;

                info!("Installing {package} with {manager}");
                if *needs_root && !is_root() {
                    run_attached("sudo", |cmd| cmd.arg(manager).args(*args).arg(package))
                } else {
                    run_attached(manager, |cmd| cmd.args(*args).arg(package))
                }
            }
        }
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

fn is_root() -> bool {
    run_capture_stdout("id", |cmd| cmd.arg("-u")).is_ok_and(|uid| uid.trim() == "0")
}

/// Heuristic detection of VPN tunnels from the network interface names
#[derive(Debug)]
pub struct VpnDetector {
    sys_class_net: PathBuf,
    proc_net_route: PathBuf,
}

impl Default for VpnDetector {
    fn default() -> Self {
        Self {
            sys_class_net: PathBuf::from("/sys/class/net"),
            proc_net_route: PathBuf::from("/proc/net/route"),
        }
    }
}

impl VpnDetector {
    /// Names of the tunnel-like interfaces, sorted and deduplicated.
    /// Unreadable sources (e.g. not on Linux) contribute nothing.
    pub fn detect(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.sys_class_net)
            .map(|dir| {
                dir.flatten()
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();

        if let Ok(routes) = std::fs::read_to_string(&self.proc_net_route) {
            names.extend(route_interfaces(&routes));
        }

        names.retain(|name| is_tunnel_like(name));
        names.sort();
        names.dedup();
        debug!("Tunnel-like interfaces: {names:?}");
        names
    }
}

/// Interface column of `/proc/net/route`, header excluded
fn route_interfaces(routes: &str) -> impl Iterator<Item = String> + '_ {
    routes
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_owned)
}

fn is_tunnel_like(name: &str) -> bool {
    let name = name.to_lowercase();
    TUNNEL_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::types::{Extension, Metadata};

    #[test]
    fn version_ordering() {
        assert_eq!(compare_versions("2024.08.06", "2024.08.06"), VersionOrdering::Same);
        assert_eq!(compare_versions("2024.10.07", "2024.08.06"), VersionOrdering::Newer);
        assert_eq!(compare_versions("2023.12.30", "2024.01.01"), VersionOrdering::Older);
        assert_eq!(compare_versions("1.2", "1.2.0"), VersionOrdering::Same);
        assert_eq!(compare_versions("v1.10", "1.9"), VersionOrdering::Newer);
        assert_eq!(compare_versions("nightly", "2024.08.06"), VersionOrdering::Incomparable);
        assert_eq!(compare_versions("", "1"), VersionOrdering::Incomparable);
    }

    #[test]
    fn tunnel_names() {
        for name in ["tun0", "wg0", "ppp0", "utun3", "nordlynx", "tailscale0", "proton0"] {
            assert!(is_tunnel_like(name), "{name}");
        }
        for name in ["lo", "eth0", "wlan0", "enp3s0", "docker0", "br-1234"] {
            assert!(!is_tunnel_like(name), "{name}");
        }
    }

    #[test]
    fn detector_reads_interfaces_and_routes() {
        let dir = tempfile::tempdir().unwrap();
        let net = dir.path().join("net");
        for iface in ["lo", "eth0", "wg0"] {
            std::fs::create_dir_all(net.join(iface)).unwrap();
        }
        let route = dir.path().join("route");
        std::fs::write(
            &route,
            "Iface\tDestination\tGateway\nwg0\t00000000\t00000000\ntun1\t0000FEA9\t00000000\neth0\t0000A8C0\t00000000\n",
        )
        .unwrap();

        let detector = VpnDetector {
            sys_class_net: net,
            proc_net_route: route,
        };
        assert_eq!(detector.detect(), ["tun1", "wg0"]);
    }

    #[test]
    fn detector_without_sources_finds_nothing() {
        let detector = VpnDetector {
            sys_class_net: PathBuf::from("/no/such/dir"),
            proc_net_route: PathBuf::from("/no/such/file"),
        };
        assert!(detector.detect().is_empty());
    }

    #[test]
    fn yes_no_prompt() {
        let mut out = Vec::new();
        assert!(ask_yes_no("Install? ", &mut "y\n".as_bytes(), &mut out));
        assert_eq!(out, b"Install? ");
        assert!(ask_yes_no("", &mut "YES\n".as_bytes(), &mut Vec::new()));
        assert!(!ask_yes_no("", &mut "\n".as_bytes(), &mut Vec::new()));
        assert!(!ask_yes_no("", &mut "".as_bytes(), &mut Vec::new()));
    }

    /// Fetcher whose version changes after a successful update
    struct Updatable {
        versions: RefCell<Vec<&'static str>>,
        update_ok: bool,
    }

    impl StreamDownloader for Updatable {
        fn name(&self) -> &str {
            "fake-dl"
        }

        fn get_metadata(&self, _url: &str) -> Result<Metadata> {
            Ok(Metadata::default())
        }

        fn download(&self, _url: &str, _path: &Path, _container: Extension) -> Result<()> {
            Ok(())
        }

        fn version(&self) -> Result<String> {
            let mut versions = self.versions.borrow_mut();
            let v = if versions.len() > 1 { versions.remove(0) } else { versions[0] };
            Ok(v.to_owned())
        }

        fn self_update(&self) -> Result<()> {
            if self.update_ok {
                Ok(())
            } else {
                Err(Error::FetchFailed("no network".into()))
            }
        }
    }

    #[test]
    fn self_update_reports_the_change() {
        let fetcher = Updatable {
            versions: RefCell::new(vec!["2024.08.06", "2024.10.07"]),
            update_ok: true,
        };
        assert_eq!(self_update(&fetcher), VersionOrdering::Newer);

        let fetcher = Updatable {
            versions: RefCell::new(vec!["2024.08.06"]),
            update_ok: true,
        };
        assert_eq!(self_update(&fetcher), VersionOrdering::Same);
    }

    #[test]
    fn failed_self_update_is_tolerated() {
        let fetcher = Updatable {
            versions: RefCell::new(vec!["2024.08.06"]),
            update_ok: false,
        };
        assert_eq!(self_update(&fetcher), VersionOrdering::Same);
    }
}
