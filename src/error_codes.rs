//! 에러 코드 상수 정의
//!
//! UI 쪽에서 i18n 처리를 위해 이동 실패 원인을 문자열 코드로 전달합니다.

/// 전체 파일 관리 권한 없음
pub const ERR_MANAGE_ALL_FILES_PERMISSION_MISSING: &str = "ERR_MANAGE_ALL_FILES_PERMISSION_MISSING";

/// 이동할 원본 파일이 사라짐
pub const ERR_MOVE_FILE_NOT_FOUND: &str = "ERR_MOVE_FILE_NOT_FOUND";

/// 이동 대상 폴더가 사라짐
pub const ERR_MOVE_DESTINATION_NOT_FOUND: &str = "ERR_MOVE_DESTINATION_NOT_FOUND";

/// 대상 볼륨의 여유 공간 부족
pub const ERR_NOT_ENOUGH_SPACE_ON_DESTINATION: &str = "ERR_NOT_ENOUGH_SPACE_ON_DESTINATION";

/// 동일한 파일이 이미 대상 폴더에 있음
pub const ERR_FILE_ALREADY_AT_DESTINATION: &str = "ERR_FILE_ALREADY_AT_DESTINATION";

/// 분류되지 않은 내부 오류
pub const ERR_INTERNAL: &str = "ERR_INTERNAL";

/// Observer 재등록 실패
pub const ERR_WATCH_START_FAILED: &str = "ERR_WATCH_START_FAILED";
