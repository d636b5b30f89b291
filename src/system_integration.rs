use anyhow::Result;
use nix::unistd::{access, AccessFlags};
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// 대상 경로가 속한 볼륨의 사용 가능한 바이트 수를 반환합니다.
/// statvfs 시스템 콜로 조회합니다.
pub fn available_space(path: &Path) -> Result<u64> {
    let stat = nix::sys::statvfs::statvfs(path)?;
    Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64)
}

/// 두 경로가 같은 볼륨(디바이스)에 있는지 확인합니다.
/// 같은 볼륨이면 복사 대신 rename으로 이동할 수 있습니다.
pub fn same_volume(a: &Path, b: &Path) -> bool {
    match (std::fs::metadata(a), std::fs::metadata(b)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev(),
        _ => false,
    }
}

/// 현재 프로세스가 디렉토리에 쓸 수 있는지 확인합니다.
pub fn is_writable_dir(path: &Path) -> bool {
    path.is_dir() && access(path, AccessFlags::W_OK | AccessFlags::X_OK).is_ok()
}
