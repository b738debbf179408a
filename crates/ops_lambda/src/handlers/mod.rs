pub mod detach;
pub mod redeploy;
pub mod verify;
