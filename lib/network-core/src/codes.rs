//! Provider error codes the reconcilers branch on

pub const VPC_NOT_FOUND: &str = "InvalidVpcID.NotFound";
pub const SUBNET_NOT_FOUND: &str = "InvalidSubnetID.NotFound";
pub const UNAUTHORIZED: &str = "UnauthorizedOperation";
pub const INVALID_PARAMETER: &str = "InvalidParameterValue";
pub const SUBNET_CONFLICT: &str = "InvalidSubnet.Conflict";
