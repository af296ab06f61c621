use crate::api::ErrorBody;
use crate::api::attendance::{SessionResponse, TapInBody, TapOutBody};
use crate::api::leave_permit::{
    CreateLeavePermit, LeaveDecisionBody, LeavePermitResponse, MemberResponse, ReturnBody,
};
use crate::api::manual_correction::{
    CorrectionResponse, CreateCorrection, DecisionBody, DecisionResponse,
};
use crate::api::reconciliation::ReconciliationBody;
use crate::model::approval::Decision;
use crate::model::attendance::SessionStatus;
use crate::model::leave_permit::{LeaveStatus, LeaveType, RequesterType};
use crate::model::manual_request::CorrectionStatus;
use crate::service::geo::GeoPoint;
use crate::service::reconciliation::{ReconciliationFailure, ReconciliationReport};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Placement Attendance API",
        version = "1.0.0",
        description = r#"
## Internship Placement Attendance

Backend for students on vocational internship placements.

### 🔹 Key Features
- **Attendance**
  - Geofenced tap-in and tap-out against the placement site, one session per day
- **Corrections**
  - Manual attendance claims approved by a supervisor, rewriting the day's session
- **Leave permits**
  - Individual or group permits; an approval or rejection applies to every member at once
- **Reconciliation**
  - Daily sweep that auto-closes forgotten sessions and marks missed working days absent

### 🔐 Security
Every endpoint requires a **JWT Bearer** token carrying the caller's id and roles
(`Student`, `Teacher`, `WaliKelas`, `Supervisor`, `Admin`).

### 🕒 Time
All dates and times are civil time in the deployment's fixed timezone.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::tap_in,
        crate::api::attendance::tap_out,
        crate::api::attendance::get_session,

        crate::api::manual_correction::create_correction,
        crate::api::manual_correction::get_correction,
        crate::api::manual_correction::decide_correction,

        crate::api::leave_permit::create_leave,
        crate::api::leave_permit::get_leave,
        crate::api::leave_permit::review_leave,
        crate::api::leave_permit::decide_leave,
        crate::api::leave_permit::record_return,

        crate::api::reconciliation::trigger_reconciliation
    ),
    components(
        schemas(
            ErrorBody,
            GeoPoint,
            TapInBody,
            TapOutBody,
            SessionStatus,
            SessionResponse,
            Decision,
            DecisionBody,
            DecisionResponse,
            CorrectionStatus,
            CreateCorrection,
            CorrectionResponse,
            RequesterType,
            LeaveType,
            LeaveStatus,
            CreateLeavePermit,
            LeaveDecisionBody,
            ReturnBody,
            MemberResponse,
            LeavePermitResponse,
            ReconciliationBody,
            ReconciliationFailure,
            ReconciliationReport
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Tap-in / tap-out APIs"),
        (name = "Corrections", description = "Manual attendance correction APIs"),
        (name = "Leave", description = "Leave permit APIs"),
        (name = "Reconciliation", description = "End-of-day sweep"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
