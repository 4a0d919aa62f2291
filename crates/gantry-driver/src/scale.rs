//! 称量设备抽象

use crate::error::ScaleError;

/// 电子天平
///
/// 读数单位为克。`stable = true` 时实现方应等待读数稳定后再返回。
pub trait Scale: Send {
    fn connect(&mut self) -> Result<(), ScaleError>;

    fn disconnect(&mut self) -> Result<(), ScaleError>;

    fn is_connected(&self) -> bool;

    /// 去皮
    fn tare(&mut self) -> Result<(), ScaleError>;

    /// 读取重量
    fn weight(&mut self, stable: bool) -> Result<f64, ScaleError>;
}

impl<T: Scale + ?Sized> Scale for Box<T> {
    fn connect(&mut self) -> Result<(), ScaleError> {
        (**self).connect()
    }

    fn disconnect(&mut self) -> Result<(), ScaleError> {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn tare(&mut self) -> Result<(), ScaleError> {
        (**self).tare()
    }

    fn weight(&mut self, stable: bool) -> Result<f64, ScaleError> {
        (**self).weight(stable)
    }
}
