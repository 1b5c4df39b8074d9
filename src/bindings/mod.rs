pub mod ppc_hwdebug;
pub mod s390_per;
pub mod signal;
