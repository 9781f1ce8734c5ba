//! Mapping of EC2, ELB and Auto Scaling API errors onto [`CloudError`]

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use clusterflow_cloud::{CloudError, CloudResource};

/// Error codes meaning "something still references this resource"
const IN_USE_CODES: &[&str] = &[
    "DependencyViolation",
    "VolumeInUse",
    "InvalidGroup.InUse",
    // Auto Scaling
    "ResourceInUse",
    "ScalingActivityInProgress",
];

/// ELB reports a missing balancer without the EC2 `.NotFound` suffix
const NOT_FOUND_CODES: &[&str] = &["LoadBalancerNotFound", "AccessPointNotFound"];

const AUTH_CODES: &[&str] = &[
    "AuthFailure",
    "UnauthorizedOperation",
    "InvalidClientTokenId",
    "ExpiredToken",
];

/// Classifies an AWS error code.
///
/// Codes ending in `.NotFound` (e.g. `InvalidVpcID.NotFound`) mean the
/// resource is already gone. Auto Scaling has no such code and answers a
/// missing group with a `ValidationError` whose message says "not found".
pub fn classify(code: Option<&str>, message: String) -> CloudError {
    match code {
        Some(code) if code.ends_with(".NotFound") || NOT_FOUND_CODES.contains(&code) => {
            CloudError::ResourceNotFound(message)
        }
        Some("ValidationError") if message.contains("not found") => {
            CloudError::ResourceNotFound(message)
        }
        Some(code) if IN_USE_CODES.contains(&code) => CloudError::ResourceInUse(message),
        Some(code) if AUTH_CODES.contains(&code) => CloudError::AuthenticationFailed(message),
        _ => CloudError::ApiError(message),
    }
}

/// Converts an SDK failure from an operation on `resource`
pub(crate) fn from_sdk<E, R>(resource: &CloudResource, err: SdkError<E, R>) -> CloudError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let code = err
        .as_service_error()
        .and_then(|e| e.code())
        .map(str::to_string);
    let message = format!("{}: {}", resource, DisplayErrorContext(&err));
    classify(code.as_deref(), message)
}

/// Converts an SDK failure from a listing call
pub(crate) fn from_list<E, R>(operation: &str, err: SdkError<E, R>) -> CloudError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let code = err
        .as_service_error()
        .and_then(|e| e.code())
        .map(str::to_string);
    let message = format!("{} failed: {}", operation, DisplayErrorContext(&err));
    classify(code.as_deref(), message)
}

/// Service error code, if the failure came back from the API
pub(crate) fn error_code<E, R>(err: &SdkError<E, R>) -> Option<&str>
where
    E: ProvideErrorMetadata,
{
    err.as_service_error().and_then(|e| e.code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_codes() {
        for code in [
            "InvalidInstanceID.NotFound",
            "InvalidVolume.NotFound",
            "InvalidGroup.NotFound",
            "InvalidSubnetID.NotFound",
            "InvalidRouteTableID.NotFound",
            "InvalidInternetGatewayID.NotFound",
            "InvalidVpcID.NotFound",
        ] {
            assert!(
                matches!(classify(Some(code), code.into()), CloudError::ResourceNotFound(_)),
                "{code}"
            );
        }
    }

    #[test]
    fn test_in_use_codes() {
        assert!(matches!(
            classify(Some("DependencyViolation"), "sg-1 in use".into()),
            CloudError::ResourceInUse(_)
        ));
        assert!(matches!(
            classify(Some("VolumeInUse"), "vol-1".into()),
            CloudError::ResourceInUse(_)
        ));
    }

    #[test]
    fn test_load_balancer_codes() {
        assert!(matches!(
            classify(
                Some("LoadBalancerNotFound"),
                "load-balancer:api-c1: There is no ACTIVE Load Balancer named 'api-c1'".into()
            ),
            CloudError::ResourceNotFound(_)
        ));
        assert!(matches!(
            classify(Some("AccessPointNotFound"), "load-balancer:api-c1".into()),
            CloudError::ResourceNotFound(_)
        ));
    }

    #[test]
    fn test_autoscaling_group_codes() {
        assert!(matches!(
            classify(
                Some("ValidationError"),
                "autoscaling-group:nodes.c1: AutoScalingGroup name not found - nodes.c1".into()
            ),
            CloudError::ResourceNotFound(_)
        ));
        assert!(matches!(
            classify(
                Some("ResourceInUse"),
                "autoscaling-group:nodes.c1: scaling activity in progress".into()
            ),
            CloudError::ResourceInUse(_)
        ));
        assert!(matches!(
            classify(
                Some("ScalingActivityInProgress"),
                "autoscaling-group:nodes.c1".into()
            ),
            CloudError::ResourceInUse(_)
        ));
        // Other validation failures are real errors
        assert!(matches!(
            classify(Some("ValidationError"), "bad group name".into()),
            CloudError::ApiError(_)
        ));
    }

    #[test]
    fn test_auth_codes() {
        assert!(matches!(
            classify(Some("UnauthorizedOperation"), "denied".into()),
            CloudError::AuthenticationFailed(_)
        ));
    }

    #[test]
    fn test_other_errors_are_fatal() {
        assert!(matches!(
            classify(Some("RequestLimitExceeded"), "slow down".into()),
            CloudError::ApiError(_)
        ));
        assert!(matches!(
            classify(None, "connection reset".into()),
            CloudError::ApiError(_)
        ));
        // Only the suffix counts
        assert!(matches!(
            classify(Some("NotFoundish"), "x".into()),
            CloudError::ApiError(_)
        ));
    }
}
